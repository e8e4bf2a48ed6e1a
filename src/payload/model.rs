use serde::Serialize;
use std::collections::BTreeMap;

use super::Result;
use crate::audit::{AuditDetails, AuditSummary, CodeInfo, ResultBag};
use crate::task::Task;

/// Report of one audit kind as shipped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportEntry {
    pub raw: AuditDetails,
    pub parsed: AuditDetails,
    pub summary: AuditSummary,
}

/// Payload delivered for a processed task.
///
/// Field order is the wire order; maps are ordered, so identical inputs
/// render to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload {
    pub title: String,
    pub content: String,
    pub version: String,
    pub checksum: String,
    pub visibility: String,
    pub project_type: String,
    pub source_url: String,
    pub source_type: String,
    pub code_info: CodeInfo,
    pub reports: BTreeMap<String, ReportEntry>,
}

impl Payload {
    /// Combine task metadata with the processor outcomes in `bag`
    pub fn from_results(task: &Task, bag: &ResultBag) -> Self {
        let code_info = bag.info().cloned().unwrap_or_default();

        let checksum = bag
            .checksum()
            .filter(|c| !c.is_empty())
            .unwrap_or(&task.checksum)
            .to_string();

        let project_type = if task.project_type.is_empty() {
            code_info.kind.clone()
        } else {
            task.project_type.clone()
        };

        let reports = bag
            .results()
            .map(|(kind, result)| {
                (
                    kind.to_string(),
                    ReportEntry {
                        raw: result.raw.clone(),
                        parsed: result.parsed.clone(),
                        summary: result.summary.clone(),
                    },
                )
            })
            .collect();

        Self {
            title: task.title.clone(),
            content: task.content.clone(),
            version: task.version.clone(),
            checksum,
            visibility: task.visibility.clone(),
            project_type,
            source_url: task.source_url.clone(),
            source_type: task.source_type.clone(),
            code_info,
            reports,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Render the payload for `task` as JSON bytes
pub fn build_payload(task: &Task, bag: &ResultBag) -> Result<Vec<u8>> {
    Payload::from_results(task, bag).to_bytes()
}
