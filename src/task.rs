//! Audit task carried through the queue

use serde::{Deserialize, Serialize};

/// A unit of audit work referencing a source archive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub version: String,
    /// Content checksum, once known
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub project_type: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub source_type: String,
    /// Requested audit kinds, in run order
    #[serde(default)]
    pub audits: Vec<String>,
}

impl Task {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            source_type: "zip".to_string(),
            ..Default::default()
        }
    }

    pub fn with_audits<I, S>(mut self, audits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audits = audits.into_iter().map(Into::into).collect();
        self
    }
}
