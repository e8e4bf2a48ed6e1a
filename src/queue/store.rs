use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{sort_documents, Condition, Fields, Order, ID_FIELD};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Document store is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Caller-supplied mutation applied to each matched document.
///
/// Receives the current fields and returns the fields to merge over them.
/// Returning an error leaves that document untouched.
pub type UpdateFn = dyn Fn(&Fields) -> Result<Fields> + Send + Sync;

/// Document store contract the task queue is built on
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document by `<collection>/<id>` path
    async fn get_doc(&self, path: &str) -> Result<Option<Fields>>;

    /// Replace a document by path
    async fn set_doc(&self, path: &str, data: Fields) -> Result<()>;

    /// Insert a new document and return its assigned identifier
    async fn add_doc(&self, collection: &str, data: Fields) -> Result<String>;

    async fn delete_doc(&self, path: &str) -> Result<()>;

    /// Select up to `limit` documents matching every condition in the given
    /// order, apply `update` to each, and return the merged documents with
    /// their identifier under [`ID_FIELD`].
    async fn query_items(
        &self,
        collection: &str,
        conditions: &[Condition],
        ordering: &[Order],
        limit: usize,
        update: &UpdateFn,
    ) -> Result<Vec<Fields>>;

    fn authenticated(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Split `<collection>/<id>` into its parts
pub fn split_path(path: &str) -> Result<(&str, &str)> {
    match path.split_once('/') {
        Some((collection, id))
            if !collection.is_empty() && !id.is_empty() && !id.contains('/') =>
        {
            Ok((collection, id))
        }
        _ => Err(QueueError::InvalidPath(path.to_string())),
    }
}

/// FjallDocumentStore keeps JSON documents in an embedded Fjall keyspace
///
/// Architecture:
/// - `documents` partition: `<collection>/<id>` → JSON object
/// - ids are UUIDv7, so key order within a collection is insertion order
/// - `query_items` runs select + mutate under one lock, so pollers sharing a
///   store never lease the same document twice
pub struct FjallDocumentStore {
    keyspace: Keyspace,
    documents: PartitionHandle,
    lease_lock: Mutex<()>,
    closed: AtomicBool,
}

impl FjallDocumentStore {
    /// Open or create a store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening FjallDocumentStore at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;
        let documents = keyspace.open_partition("documents", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            documents,
            lease_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    fn write(&self, path: &str, mut data: Fields) -> Result<()> {
        data.remove(ID_FIELD);
        let value = serde_json::to_vec(&data)?;
        self.documents.insert(path.as_bytes(), value)?;
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Option<Fields>> {
        match self.documents.get(path.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All documents of a collection as (id, fields), in key order
    fn scan(&self, collection: &str) -> Result<Vec<(String, Fields)>> {
        let prefix = format!("{}/", collection);
        let mut docs = Vec::new();

        for item in self.documents.prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            let key = String::from_utf8_lossy(&key);
            let id = key[prefix.len()..].to_string();
            docs.push((id, serde_json::from_slice(&value)?));
        }

        Ok(docs)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FjallDocumentStore {
    async fn get_doc(&self, path: &str) -> Result<Option<Fields>> {
        self.ensure_open()?;
        split_path(path)?;
        self.read(path)
    }

    async fn set_doc(&self, path: &str, data: Fields) -> Result<()> {
        self.ensure_open()?;
        split_path(path)?;
        self.write(path, data)?;
        debug!(path, "Document replaced");
        Ok(())
    }

    async fn add_doc(&self, collection: &str, data: Fields) -> Result<String> {
        self.ensure_open()?;
        if collection.is_empty() || collection.contains('/') {
            return Err(QueueError::InvalidPath(collection.to_string()));
        }

        let id = Uuid::now_v7().to_string();
        let path = format!("{}/{}", collection, id);
        self.write(&path, data)?;

        debug!(collection, id = %id, "Document added");
        Ok(id)
    }

    async fn delete_doc(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        split_path(path)?;
        self.documents.remove(path.as_bytes())?;
        debug!(path, "Document deleted");
        Ok(())
    }

    async fn query_items(
        &self,
        collection: &str,
        conditions: &[Condition],
        ordering: &[Order],
        limit: usize,
        update: &UpdateFn,
    ) -> Result<Vec<Fields>> {
        self.ensure_open()?;
        let _lease = self.lease_lock.lock().await;

        let mut candidates: Vec<(String, Fields)> = self
            .scan(collection)?
            .into_iter()
            .filter(|(_, doc)| conditions.iter().all(|c| c.matches(doc)))
            .collect();
        sort_documents(&mut candidates, ordering);

        let mut results = Vec::new();
        for (id, mut doc) in candidates.into_iter().take(limit) {
            let overrides = match update(&doc) {
                Ok(overrides) => overrides,
                Err(e) => {
                    warn!(collection, id = %id, error = %e, "Update rejected, document left untouched");
                    continue;
                }
            };

            for (key, value) in overrides {
                doc.insert(key, value);
            }
            self.write(&format!("{}/{}", collection, id), doc.clone())?;

            doc.insert(ID_FIELD.to_string(), id.into());
            results.push(doc);
        }

        debug!(collection, matched = results.len(), "Query applied updates");
        Ok(results)
    }

    fn authenticated(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.flush()?;
            info!("FjallDocumentStore closed");
        }
        Ok(())
    }
}
