use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::store::{DocumentStore, QueueError, Result};
use super::types::{Condition, Fields, ID_FIELD, Operator, Order};
use crate::config::QueueConfig;
use crate::task::Task;

/// Stored shape of a queued task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    #[serde(default)]
    pub retries: u32,
    /// Unix ms until which the task is leased to a worker
    #[serde(default)]
    pub lease_until: i64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub message: Task,
}

impl TaskDocument {
    pub fn new(task: Task) -> Self {
        Self {
            retries: 0,
            lease_until: 0,
            created_at: now_ms(),
            last_error: None,
            message: task,
        }
    }

    pub fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(QueueError::Provider("task document is not an object".into())),
        }
    }

    pub fn from_fields(mut fields: Fields) -> Result<Self> {
        fields.remove(ID_FIELD);
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Append an error annotation; earlier annotations are kept
    pub fn annotate(&mut self, error: &str) {
        match &mut self.last_error {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(error);
            }
            None => self.last_error = Some(error.to_string()),
        }
    }
}

/// A task handed to a worker by one poll
#[derive(Debug, Clone, PartialEq)]
pub struct LeasedTask {
    /// Provider-assigned identifier, when the provider assigns one
    pub id: Option<String>,
    /// Retry count after this lease
    pub retries: u32,
    pub task: Task,
    /// A failure of this attempt is terminal
    pub last_attempt: bool,
}

/// Lease/retry task queue over a [`DocumentStore`] collection
///
/// Tasks whose retry count reached `max_retries` are dead-lettered: they stay
/// in the collection for inspection but no poll matches them again.
pub struct TaskQueue {
    store: Arc<dyn DocumentStore>,
    collection: String,
    max_retries: u32,
    lease: Duration,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn DocumentStore>, config: &QueueConfig) -> Self {
        Self::with_settings(
            store,
            config.collection.clone(),
            config.max_retries,
            Duration::from_secs(config.lease_secs),
        )
    }

    pub fn with_settings(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        max_retries: u32,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            max_retries,
            lease,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn path(&self, id: &str) -> String {
        format!("{}/{}", self.collection, id)
    }

    /// Enqueue a new task and return its identifier
    pub async fn send_task(&self, task: Task) -> Result<String> {
        let doc = TaskDocument::new(task);
        let id = self.store.add_doc(&self.collection, doc.to_fields()?).await?;
        info!(collection = %self.collection, task_id = %id, title = %doc.message.title, "Task enqueued");
        Ok(id)
    }

    /// Conditions a document must meet to be leased at `now`
    pub fn eligibility(&self, now: i64) -> Vec<Condition> {
        vec![
            Condition::new("retries", Operator::Lt, self.max_retries),
            Condition::new("lease_until", Operator::Le, now),
        ]
    }

    /// Lease up to `limit` eligible tasks, fewest retries and oldest first
    pub async fn next_tasks(&self, limit: usize) -> Result<Vec<LeasedTask>> {
        let now = now_ms();
        let lease_until = now + self.lease.as_millis() as i64;

        let update = move |doc: &Fields| -> Result<Fields> {
            let retries = match doc.get("retries") {
                None => 0,
                Some(value) => value
                    .as_u64()
                    .ok_or_else(|| QueueError::Rejected(format!("retries is not a count: {}", value)))?,
            };

            let mut overrides = Fields::new();
            overrides.insert("retries".into(), (retries + 1).into());
            overrides.insert("lease_until".into(), lease_until.into());
            Ok(overrides)
        };

        let docs = self
            .store
            .query_items(
                &self.collection,
                &self.eligibility(now),
                &[Order::asc("retries"), Order::asc("created_at")],
                limit,
                &update,
            )
            .await?;

        let mut leased = Vec::with_capacity(docs.len());
        for fields in docs {
            let id = fields
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string);

            match TaskDocument::from_fields(fields) {
                Ok(doc) => {
                    debug!(task_id = ?id, retries = doc.retries, "Task leased");
                    leased.push(LeasedTask {
                        id,
                        retries: doc.retries,
                        last_attempt: doc.retries >= self.max_retries,
                        task: doc.message,
                    });
                }
                Err(e) => {
                    warn!(task_id = ?id, error = %e, "Skipping malformed task document");
                }
            }
        }

        Ok(leased)
    }

    pub async fn get(&self, id: &str) -> Result<Option<TaskDocument>> {
        match self.store.get_doc(&self.path(id)).await? {
            Some(fields) => Ok(Some(TaskDocument::from_fields(fields)?)),
            None => Ok(None),
        }
    }

    /// Remove a task after terminal success
    pub async fn complete(&self, id: &str) -> Result<()> {
        self.store.delete_doc(&self.path(id)).await?;
        info!(task_id = %id, "Task completed");
        Ok(())
    }

    /// Return a failed task to the queue with an error annotation.
    ///
    /// The retry count is left as leased, so a task on its last attempt is
    /// dead-lettered from here on.
    pub async fn release(&self, id: &str, error: &str) -> Result<()> {
        self.settle(id, error, false).await
    }

    /// Exclude a task from every future poll while keeping it for inspection
    pub async fn dead_letter(&self, id: &str, error: &str) -> Result<()> {
        self.settle(id, error, true).await
    }

    async fn settle(&self, id: &str, error: &str, terminal: bool) -> Result<()> {
        let path = self.path(id);
        let Some(fields) = self.store.get_doc(&path).await? else {
            // Completed by a concurrent delivery of the same task
            info!(task_id = %id, error, "Task already settled");
            return Ok(());
        };

        let mut doc = TaskDocument::from_fields(fields)?;
        if terminal {
            doc.retries = doc.retries.max(self.max_retries);
        }
        doc.lease_until = 0;
        doc.annotate(error);
        self.store.set_doc(&path, doc.to_fields()?).await?;

        if doc.retries >= self.max_retries {
            warn!(task_id = %id, retries = doc.retries, error, "Task dead-lettered");
        } else {
            info!(task_id = %id, retries = doc.retries, error, "Task requeued");
        }
        Ok(())
    }
}

/// Current Unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
