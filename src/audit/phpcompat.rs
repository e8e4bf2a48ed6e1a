//! PHP version-compatibility post-processor
//!
//! Consumes the PHPCompatibility report of its parent phpcs run, uploads a
//! per-rule detail artifact and derives the compatible PHP versions.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::phpcs::{PhpcsMessage, PhpcsResults};
use super::result::{DetailsRef, ResultBag};
use super::versions::{breaks_versions, exclude_versions, merge_versions, php_major_versions};
use super::{PostProcessor, Processor};
use crate::task::Task;

pub const KIND: &str = "phpcs_phpcompatibility";

pub const ERR_NO_PARENT: &str = "could not get results from parent process";
pub const ERR_PARSE: &str = "could not get phpcs results";
pub const ERR_NO_TEMP_FOLDER: &str = "no tempFolder to write results to before upload to fileStore";
pub const ERR_NO_CHECKSUM: &str = "there was no checksum to be used for filenames";
pub const ERR_WRITE: &str = "could not write PHPCompatibility details to disk";
pub const ERR_UPLOAD: &str = "could not write PHPCompatibility details to file store";

/// Violations of one rule across the package
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleDetail {
    pub breaks: Vec<String>,
    pub files: BTreeMap<String, PhpcsMessage>,
}

#[derive(Default)]
pub struct PhpCompat {
    report: Option<Box<dyn Read + Send + Sync>>,
    parent_kind: Option<String>,
}

impl PhpCompat {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&self, bag: &mut ResultBag, parent_kind: &str, message: &str) {
        warn!(kind = KIND, parent = parent_kind, error = message, "Post-processing failed");
        bag.record_error(KIND, message);
        if let Some(parent) = bag.get_mut(parent_kind) {
            parent.append_error(message);
        }
    }
}

/// Group violations by rule; the first violation seen for a rule decides
/// which versions it breaks.
pub fn group_by_rule(results: &PhpcsResults) -> (BTreeMap<String, RuleDetail>, Vec<String>) {
    let mut rules: BTreeMap<String, RuleDetail> = BTreeMap::new();
    let mut broken = Vec::new();

    for (filename, file) in &results.files {
        for violation in &file.messages {
            let rule = rules.entry(violation.source.clone()).or_insert_with(|| {
                let breaks = breaks_versions(&violation.message);
                broken = merge_versions(&broken, &breaks);
                RuleDetail {
                    breaks,
                    files: BTreeMap::new(),
                }
            });
            rule.files.insert(filename.clone(), violation.clone());
        }
    }

    (rules, broken)
}

/// Storage key and local path of the detail artifact
fn detail_location(bag: &ResultBag) -> Result<(String, PathBuf), &'static str> {
    let temp_folder = bag.temp_folder().ok_or(ERR_NO_TEMP_FOLDER)?;
    let checksum = bag.checksum().ok_or(ERR_NO_CHECKSUM)?;
    let key = format!("{}-{}-detail.json", checksum, KIND);
    let path = temp_folder.join(&key);
    Ok((key, path))
}

#[async_trait]
impl Processor for PhpCompat {
    fn kind(&self) -> &str {
        KIND
    }

    async fn process(&mut self, _task: &Task, bag: &mut ResultBag) {
        let mut report = Vec::new();
        if let Some(mut reader) = self.report.take() {
            if let Err(e) = reader.read_to_end(&mut report) {
                debug!(error = %e, "Could not read parent report");
                report.clear();
            }
        }

        let parent_kind = match self.parent_kind.clone() {
            Some(kind) if bag.get(&kind).is_some() => kind,
            _ => {
                warn!(kind = KIND, "Parent result missing");
                bag.record_error(KIND, ERR_NO_PARENT);
                return;
            }
        };

        let results = match PhpcsResults::parse(&report) {
            Ok(results) => results,
            Err(e) => {
                debug!(error = %e, "Invalid phpcs report");
                self.fail(bag, &parent_kind, ERR_PARSE);
                return;
            }
        };

        let (rules, broken) = group_by_rule(&results);

        let (key, path) = match detail_location(bag) {
            Ok(location) => location,
            Err(message) => {
                self.fail(bag, &parent_kind, message);
                return;
            }
        };

        let written = match serde_json::to_vec(&rules) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = written {
            debug!(?path, error = %e, "Detail write failed");
            self.fail(bag, &parent_kind, ERR_WRITE);
            return;
        }

        let Some(store) = bag.file_store() else {
            self.fail(bag, &parent_kind, ERR_UPLOAD);
            return;
        };
        if let Err(e) = store.upload_file(&path, &key).await {
            debug!(key = %key, error = %e, "Detail upload failed");
            self.fail(bag, &parent_kind, ERR_UPLOAD);
            return;
        }

        let details = DetailsRef {
            kind: store.kind().to_string(),
            key: key.clone(),
            bucket_name: store.collection_ref().to_string(),
        };
        let compatible = exclude_versions(&php_major_versions(), &broken);

        if let Some(parent) = bag.get_mut(&parent_kind) {
            if !parent.set_details_once(details) {
                debug!(parent = %parent_kind, "Details already set, keeping existing");
            }
            parent.compatible_versions = compatible;
        }

        info!(kind = KIND, key = %key, rules = rules.len(), broken = broken.len(), "PHP compatibility computed");
    }
}

impl PostProcessor for PhpCompat {
    fn set_report(&mut self, report: Box<dyn Read + Send + Sync>) {
        self.report = Some(report);
    }

    fn set_parent(&mut self, parent: &dyn Processor) {
        self.parent_kind = Some(parent.kind().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditResult;
    use crate::storage::{ObjectStorage, StorageError, StorageProvider};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CHECKSUM: &str = "de48cd1a82b5f5dd9aafb44f8822ca5eef20b6008145d160bcc85d4dd9fee7e6";

    const REPORT: &str = r#"{
        "totals": {"errors": 3, "warnings": 0, "fixable": 0},
        "files": {
            "/tmp/plugin/a.php": {"errors": 2, "warnings": 0, "messages": [
                {"message": "Extension 'mysql_' is deprecated since PHP 5.5 and removed since PHP 7.0", "source": "PHPCompatibility.Extensions.RemovedExtensions.mysql_DeprecatedRemoved", "severity": 5, "type": "ERROR", "line": 3, "column": 5, "fixable": false},
                {"message": "Short array syntax is not supported prior to PHP 5.4", "source": "PHPCompatibility.Syntax.NewShortArray.Found", "severity": 5, "type": "ERROR", "line": 9, "column": 1, "fixable": false}
            ]},
            "/tmp/plugin/b.php": {"errors": 1, "warnings": 0, "messages": [
                {"message": "Extension 'mysql_' is deprecated since PHP 5.5 and removed since PHP 7.0", "source": "PHPCompatibility.Extensions.RemovedExtensions.mysql_DeprecatedRemoved", "severity": 5, "type": "ERROR", "line": 12, "column": 5, "fixable": false}
            ]}
        }
    }"#;

    struct Parent;

    #[async_trait]
    impl Processor for Parent {
        fn kind(&self) -> &str {
            KIND
        }

        async fn process(&mut self, _task: &Task, _bag: &mut ResultBag) {}
    }

    struct FailingStorage;

    #[async_trait]
    impl StorageProvider for FailingStorage {
        async fn upload_file(&self, _local_path: &Path, remote_key: &str) -> crate::storage::Result<()> {
            Err(StorageError::UploadFailed(remote_key.to_string()))
        }

        fn kind(&self) -> &str {
            "failing"
        }

        fn collection_ref(&self) -> &str {
            "nowhere"
        }
    }

    fn bag(temp_dir: &TempDir, store: Arc<dyn StorageProvider>) -> ResultBag {
        let mut bag = ResultBag::new();
        bag.set_temp_folder(temp_dir.path());
        bag.set_checksum(CHECKSUM);
        bag.set_file_store(store);
        bag.set_audits(vec![KIND.to_string()]);
        bag.insert(KIND, AuditResult::default());
        bag
    }

    fn post_processor(report: &str) -> PhpCompat {
        let mut processor = PhpCompat::new();
        processor.set_report(Box::new(Cursor::new(report.as_bytes().to_vec())));
        processor.set_parent(&Parent);
        processor
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_process_success() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(ObjectStorage::in_memory());
        let mut bag = bag(&temp_dir, storage.clone());

        post_processor(REPORT).process(&Task::default(), &mut bag).await;

        let key = format!("{}-{}-detail.json", CHECKSUM, KIND);
        let result = bag.get(KIND).unwrap();
        assert_eq!(bag.error(KIND), None);
        assert_eq!(result.error, "");
        assert_eq!(
            result.details,
            Some(DetailsRef {
                kind: "memory".into(),
                key: key.clone(),
                bucket_name: "auditbox-local".into(),
            })
        );
        assert_eq!(result.compatible_versions, strings(&["5.4", "5.5", "5.6"]));

        assert!(temp_dir.path().join(&key).exists());
        let uploaded = storage.download(&key).await.unwrap();
        let detail: serde_json::Value = serde_json::from_slice(&uploaded).unwrap();
        let mysql = &detail["PHPCompatibility.Extensions.RemovedExtensions.mysql_DeprecatedRemoved"];
        assert_eq!(mysql["breaks"][0], "7.0");
        assert_eq!(mysql["files"].as_object().unwrap().len(), 2);
        assert_eq!(mysql["files"]["/tmp/plugin/b.php"]["line"], 12);
    }

    #[tokio::test]
    async fn test_details_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = bag(&temp_dir, Arc::new(ObjectStorage::in_memory()));
        let existing = DetailsRef {
            kind: "local".into(),
            key: "phpcs-full.json".into(),
            bucket_name: "reports".into(),
        };
        bag.get_mut(KIND).unwrap().details = Some(existing.clone());

        post_processor(REPORT).process(&Task::default(), &mut bag).await;

        let result = bag.get(KIND).unwrap();
        assert_eq!(result.details, Some(existing));
        assert_eq!(result.compatible_versions, strings(&["5.4", "5.5", "5.6"]));
    }

    #[tokio::test]
    async fn test_missing_parent_result() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = ResultBag::new();
        bag.set_temp_folder(temp_dir.path());
        bag.set_checksum(CHECKSUM);

        post_processor(REPORT).process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_NO_PARENT));
        assert!(bag.get(KIND).is_none());
    }

    #[tokio::test]
    async fn test_unbound_parent() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = bag(&temp_dir, Arc::new(ObjectStorage::in_memory()));

        let mut processor = PhpCompat::new();
        processor.set_report(Box::new(Cursor::new(REPORT.as_bytes().to_vec())));
        processor.process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_NO_PARENT));
        assert!(bag.get(KIND).unwrap().compatible_versions.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_report() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = bag(&temp_dir, Arc::new(ObjectStorage::in_memory()));
        bag.get_mut(KIND).unwrap().append_error("phpcs exited with status 2");

        post_processor("<html>").process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_PARSE));
        let result = bag.get(KIND).unwrap();
        assert_eq!(result.error, format!("phpcs exited with status 2\n{}", ERR_PARSE));
        assert!(result.compatible_versions.is_empty());
    }

    #[tokio::test]
    async fn test_absent_report_is_a_parse_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = bag(&temp_dir, Arc::new(ObjectStorage::in_memory()));

        let mut processor = PhpCompat::new();
        processor.set_parent(&Parent);
        processor.process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_PARSE));
    }

    #[tokio::test]
    async fn test_missing_context() {
        let temp_dir = TempDir::new().unwrap();

        let mut no_temp = ResultBag::new();
        no_temp.set_checksum(CHECKSUM);
        no_temp.insert(KIND, AuditResult::default());
        post_processor(REPORT).process(&Task::default(), &mut no_temp).await;
        assert_eq!(no_temp.error(KIND), Some(ERR_NO_TEMP_FOLDER));
        assert_eq!(no_temp.get(KIND).unwrap().error, ERR_NO_TEMP_FOLDER);

        let mut no_checksum = ResultBag::new();
        no_checksum.set_temp_folder(temp_dir.path());
        no_checksum.insert(KIND, AuditResult::default());
        post_processor(REPORT).process(&Task::default(), &mut no_checksum).await;
        assert_eq!(no_checksum.error(KIND), Some(ERR_NO_CHECKSUM));
        assert!(no_checksum.get(KIND).unwrap().details.is_none());
    }

    #[tokio::test]
    async fn test_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = bag(&temp_dir, Arc::new(ObjectStorage::in_memory()));
        bag.set_temp_folder(temp_dir.path().join("missing"));

        post_processor(REPORT).process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_WRITE));
        assert_eq!(bag.get(KIND).unwrap().error, ERR_WRITE);
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = bag(&temp_dir, Arc::new(FailingStorage));

        post_processor(REPORT).process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_UPLOAD));
        let result = bag.get(KIND).unwrap();
        assert!(result.details.is_none());
        assert!(result.compatible_versions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let mut bag = ResultBag::new();
        bag.set_temp_folder(temp_dir.path());
        bag.set_checksum(CHECKSUM);
        bag.insert(KIND, AuditResult::default());

        post_processor(REPORT).process(&Task::default(), &mut bag).await;

        assert_eq!(bag.error(KIND), Some(ERR_UPLOAD));
    }

    #[test]
    fn test_group_by_rule_uses_first_violation() {
        let results = PhpcsResults::parse(REPORT.as_bytes()).unwrap();
        let (rules, broken) = group_by_rule(&results);

        assert_eq!(rules.len(), 2);
        assert_eq!(rules["PHPCompatibility.Syntax.NewShortArray.Found"].breaks, strings(&["5.2", "5.3"]));
        assert_eq!(broken.first().map(String::as_str), Some("5.2"));
        assert_eq!(broken.last().map(String::as_str), Some("8.3"));
        assert_eq!(broken.len(), 11);
    }
}
