//! Blob storage for detail artifacts
//! Uses Apache Arrow object_store crate

use async_trait::async_trait;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageKind};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Capability for persisting artifacts produced while auditing.
///
/// One provider is shared by every worker, so implementations must be safe to
/// call concurrently. The pipeline never opens or closes it.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Upload the file at `local_path` under `remote_key`
    async fn upload_file(&self, local_path: &Path, remote_key: &str) -> Result<()>;

    /// Storage-kind tag recorded in artifact references
    fn kind(&self) -> &str;

    /// Bucket (or collection) the artifacts land in
    fn collection_ref(&self) -> &str;
}

/// Storage provider backed by any object_store backend
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    kind: String,
    pub bucket: String,
}

impl ObjectStorage {
    pub fn new(store: Arc<dyn ObjectStore>, kind: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            kind: kind.into(),
            bucket: bucket.into(),
        }
    }

    /// In-memory storage for tests and local runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory", "auditbox-local")
    }

    /// Build the provider selected in configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageKind::Memory => Ok(Self::new(
                Arc::new(InMemory::new()),
                "memory",
                config.bucket.clone(),
            )),
            StorageKind::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    StorageError::InvalidConfig("local storage requires a root".to_string())
                })?;
                let root = root.join(&config.bucket);
                std::fs::create_dir_all(&root)?;
                let store = LocalFileSystem::new_with_prefix(&root)?;
                Ok(Self::new(Arc::new(store), "local", config.bucket.clone()))
            }
        }
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a stored object
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl StorageProvider for ObjectStorage {
    async fn upload_file(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let size = data.len();
        let path = StoragePath::from(remote_key);

        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", remote_key, e)))?;

        tracing::info!(key = remote_key, size, bucket = %self.bucket, "Uploaded to storage");
        Ok(())
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn collection_ref(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_file_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("detail.json");
        std::fs::write(&local, b"{\"a\":1}").unwrap();

        let storage = ObjectStorage::in_memory();
        storage.upload_file(&local, "abc-detail.json").await.unwrap();

        assert!(storage.exists("abc-detail.json").await.unwrap());
        assert_eq!(storage.download("abc-detail.json").await.unwrap(), b"{\"a\":1}");
        assert_eq!(storage.kind(), "memory");
        assert_eq!(storage.collection_ref(), "auditbox-local");
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let storage = ObjectStorage::in_memory();
        let result = storage
            .upload_file(Path::new("/nonexistent/detail.json"), "key.json")
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!storage.exists("key.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_reupload_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("detail.json");
        let storage = ObjectStorage::in_memory();

        std::fs::write(&local, b"first").unwrap();
        storage.upload_file(&local, "same.json").await.unwrap();
        std::fs::write(&local, b"second").unwrap();
        storage.upload_file(&local, "same.json").await.unwrap();

        assert_eq!(storage.download("same.json").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_local_provider_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            provider: StorageKind::Local,
            bucket: "reports".to_string(),
            root: Some(temp_dir.path().to_path_buf()),
        };

        let storage = ObjectStorage::from_config(&config).unwrap();
        let local = temp_dir.path().join("x.json");
        std::fs::write(&local, b"x").unwrap();
        storage.upload_file(&local, "x.json").await.unwrap();

        assert_eq!(storage.kind(), "local");
        assert!(temp_dir.path().join("reports").join("x.json").exists());
    }

    #[test]
    fn test_local_provider_requires_root() {
        let config = StorageConfig {
            provider: StorageKind::Local,
            bucket: "reports".to_string(),
            root: None,
        };
        assert!(matches!(
            ObjectStorage::from_config(&config),
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
