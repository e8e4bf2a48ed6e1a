//! Per-task result aggregate shared by the processors of one pipeline run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::StorageProvider;

/// Location of a report on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDetails {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl AuditDetails {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.filename.is_empty() && self.path.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_count: Option<u64>,
}

/// Reference to an artifact uploaded to a [`StorageProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub bucket_name: String,
}

/// Outcome of one audit kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    #[serde(default)]
    pub raw: AuditDetails,
    #[serde(default)]
    pub parsed: AuditDetails,
    #[serde(default)]
    pub summary: AuditSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailsRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatible_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl AuditResult {
    /// Append to the error accumulator; existing text is never replaced
    pub fn append_error(&mut self, message: &str) {
        append_line(&mut self.error, message);
    }

    /// Set `details` unless an earlier writer already did. Returns whether it was set.
    pub fn set_details_once(&mut self, details: DetailsRef) -> bool {
        if self.details.is_some() {
            return false;
        }
        self.details = Some(details);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoDetails {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClocResult {
    pub blank: u64,
    pub comment: u64,
    pub code: u64,
    #[serde(rename = "nFiles")]
    pub files: u64,
}

/// Code-structure summary of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: Vec<InfoDetails>,
    pub cloc: BTreeMap<String, ClocResult>,
}

/// Typed result bag.
///
/// Infrastructure context (`tempFolder`, `checksum`, `fileStore`, `audits`)
/// has named accessors; processor outcomes live under their kind.
#[derive(Default)]
pub struct ResultBag {
    temp_folder: Option<PathBuf>,
    checksum: Option<String>,
    file_store: Option<Arc<dyn StorageProvider>>,
    audits: Option<Vec<String>>,
    info: Option<CodeInfo>,
    results: BTreeMap<String, AuditResult>,
    errors: BTreeMap<String, String>,
}

impl ResultBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temp_folder(&self) -> Option<&Path> {
        self.temp_folder.as_deref()
    }

    pub fn set_temp_folder(&mut self, folder: impl Into<PathBuf>) {
        self.temp_folder = Some(folder.into());
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn set_checksum(&mut self, checksum: impl Into<String>) {
        self.checksum = Some(checksum.into());
    }

    pub fn file_store(&self) -> Option<Arc<dyn StorageProvider>> {
        self.file_store.clone()
    }

    pub fn set_file_store(&mut self, store: Arc<dyn StorageProvider>) {
        self.file_store = Some(store);
    }

    pub fn audits(&self) -> Option<&[String]> {
        self.audits.as_deref()
    }

    pub fn set_audits(&mut self, audits: Vec<String>) {
        self.audits = Some(audits);
    }

    pub fn info(&self) -> Option<&CodeInfo> {
        self.info.as_ref()
    }

    pub fn set_info(&mut self, info: CodeInfo) {
        self.info = Some(info);
    }

    pub fn get(&self, kind: &str) -> Option<&AuditResult> {
        self.results.get(kind)
    }

    pub fn get_mut(&mut self, kind: &str) -> Option<&mut AuditResult> {
        self.results.get_mut(kind)
    }

    pub fn insert(&mut self, kind: impl Into<String>, result: AuditResult) {
        self.results.insert(kind.into(), result);
    }

    /// Processor outcomes ordered by kind
    pub fn results(&self) -> impl Iterator<Item = (&str, &AuditResult)> {
        self.results.iter().map(|(kind, result)| (kind.as_str(), result))
    }

    /// Record a processor failure under its own kind
    pub fn record_error(&mut self, kind: &str, message: &str) {
        append_line(self.errors.entry(kind.to_string()).or_default(), message);
    }

    pub fn error(&self, kind: &str) -> Option<&str> {
        self.errors.get(kind).map(String::as_str)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Debug for ResultBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBag")
            .field("temp_folder", &self.temp_folder)
            .field("checksum", &self.checksum)
            .field("file_store", &self.file_store.as_ref().map(|s| s.kind().to_string()))
            .field("audits", &self.audits)
            .field("results", &self.results.keys().collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish()
    }
}

fn append_line(target: &mut String, message: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(message);
}
