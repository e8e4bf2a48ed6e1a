//! Task runner - processes individual leased tasks

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{ProcessorRegistry, ResultBag};
use crate::error::{Error, Result};
use crate::observability::Metrics;
use crate::payload::{PayloadSender, build_payload};
use crate::queue::{LeasedTask, TaskQueue};
use crate::source::{ExtractFs, HttpClient, SourceFetcher, StdFs, ZipSource};
use crate::storage::StorageProvider;
use crate::task::Task;

/// Collaborators shared by every worker of a pool
pub struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub registry: ProcessorRegistry,
    pub storage: Arc<dyn StorageProvider>,
    pub sender: Arc<dyn PayloadSender>,
    pub http: HttpClient,
    pub fs: Arc<dyn ExtractFs>,
    /// Per-task working directories are created below this path
    pub work_dir: PathBuf,
    /// Payloads are delivered to `<payload_dir>/<checksum>.json`
    pub payload_dir: PathBuf,
    pub metrics: Arc<Metrics>,
}

impl WorkerContext {
    pub fn new(
        queue: Arc<TaskQueue>,
        storage: Arc<dyn StorageProvider>,
        sender: Arc<dyn PayloadSender>,
        http: HttpClient,
        work_dir: impl Into<PathBuf>,
        payload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            queue,
            registry: ProcessorRegistry::with_defaults(),
            storage,
            sender,
            http,
            fs: Arc::new(StdFs),
            work_dir: work_dir.into(),
            payload_dir: payload_dir.into(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn ExtractFs>) -> Self {
        self.fs = fs;
        self
    }
}

/// How a handled task was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { checksum: String },
    Requeued { error: String },
    DeadLettered { error: String },
}

#[derive(Clone)]
pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self { id, ctx }
    }

    /// Process one leased task and settle it in the queue
    pub async fn handle(&self, leased: LeasedTask) -> Result<Outcome> {
        let task_id = leased.id.clone().unwrap_or_else(|| "unassigned".to_string());
        // A redelivered task may be handled concurrently; each handling owns its directory
        let work = self
            .ctx
            .work_dir
            .join(format!("task-{}-{}", task_id, Uuid::new_v4()));

        info!(
            worker_id = self.id,
            task_id = %task_id,
            retries = leased.retries,
            url = %leased.task.source_url,
            "Processing task"
        );

        let result = self.process(&leased.task, &work).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(task_id = %task_id, error = %e, "Failed to remove work directory");
            }
        }

        match result {
            Ok(checksum) => {
                if let Some(id) = &leased.id {
                    self.ctx.queue.complete(id).await?;
                }
                self.ctx.metrics.task_completed();
                info!(task_id = %task_id, checksum = %checksum, "Task shipped");
                Ok(Outcome::Completed { checksum })
            }
            Err(e) => {
                let error = e.to_string();
                let terminal = leased.last_attempt || !e.is_retryable();

                if let Some(id) = &leased.id {
                    if terminal {
                        self.ctx.queue.dead_letter(id, &error).await?;
                    } else {
                        self.ctx.queue.release(id, &error).await?;
                    }
                }

                if terminal {
                    self.ctx.metrics.task_dead_lettered();
                    error!(task_id = %task_id, kind = ?e.kind(), error = %e, "Task failed permanently");
                    Ok(Outcome::DeadLettered { error })
                } else {
                    self.ctx.metrics.task_requeued();
                    warn!(task_id = %task_id, kind = ?e.kind(), error = %e, "Task failed, requeued");
                    Ok(Outcome::Requeued { error })
                }
            }
        }
    }

    /// Fetch, audit and ship; returns the package checksum
    async fn process(&self, task: &Task, work: &Path) -> Result<String> {
        tokio::fs::create_dir_all(work).await?;

        let mut source =
            ZipSource::new(task.source_url.as_str(), self.ctx.http.clone()).with_fs(self.ctx.fs.clone());
        source.prepare_files(work).await?;

        let checksum = source.checksum().to_string();
        if checksum.is_empty() {
            return Err(Error::State("archive produced no checksum".to_string()));
        }
        debug!(checksum = %checksum, files = source.files().len(), "Archive ready");

        let mut bag = ResultBag::new();
        bag.set_temp_folder(work);
        bag.set_checksum(checksum.as_str());
        bag.set_file_store(self.ctx.storage.clone());
        bag.set_audits(task.audits.clone());

        let invoked = self.ctx.registry.build().run(task, &mut bag).await;
        if bag.has_errors() {
            warn!(checksum = %checksum, invoked, "Audit finished with processor errors");
        } else {
            debug!(checksum = %checksum, invoked, "Audit finished");
        }

        let payload = build_payload(task, &bag)?;
        tokio::fs::create_dir_all(&self.ctx.payload_dir).await?;
        let destination = self.ctx.payload_dir.join(format!("{}.json", checksum));
        self.ctx.sender.send_payload(&destination, &payload).await?;

        Ok(checksum)
    }

    /// Handle tasks from `rx` until it closes or `cancel` fires
    pub async fn run(self, mut rx: mpsc::Receiver<LeasedTask>, cancel: CancellationToken) {
        info!(worker_id = self.id, "Worker started");

        loop {
            let leased = tokio::select! {
                _ = cancel.cancelled() => break,
                leased = rx.recv() => match leased {
                    Some(leased) => leased,
                    None => break,
                },
            };

            if let Err(e) = self.handle(leased).await {
                error!(worker_id = self.id, error = %e, "Failed to settle task");
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FilePayload;
    use crate::queue::FjallDocumentStore;
    use crate::source::HttpConfig;
    use crate::storage::ObjectStorage;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn zip_bytes() -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = ::zip::ZipWriter::new(&mut cursor);
            let options = ::zip::write::FileOptions::default();
            writer.start_file("function.php", options).unwrap();
            writer.write_all(b"<?php echo 'hello';").unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    struct Harness {
        temp: TempDir,
        queue: Arc<TaskQueue>,
        worker: Worker,
    }

    fn harness(max_retries: u32) -> Harness {
        harness_with_lease(max_retries, Duration::from_secs(600))
    }

    fn harness_with_lease(max_retries: u32, lease: Duration) -> Harness {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FjallDocumentStore::open(temp.path().join("queue")).unwrap());
        let queue = Arc::new(TaskQueue::with_settings(
            store,
            "audit-tasks",
            max_retries,
            lease,
        ));
        let http = HttpClient::new(HttpConfig {
            max_retries: 1,
            ..HttpConfig::default()
        })
        .unwrap();
        let ctx = WorkerContext::new(
            queue.clone(),
            Arc::new(ObjectStorage::in_memory()),
            Arc::new(FilePayload::new()),
            http,
            temp.path().join("work"),
            temp.path().join("payloads"),
        );
        Harness {
            worker: Worker::new(0, Arc::new(ctx)),
            queue,
            temp,
        }
    }

    #[tokio::test]
    async fn test_handle_ships_and_completes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes()))
            .mount(&server)
            .await;

        let h = harness(3);
        let id = h
            .queue
            .send_task(Task::new("Plugin", format!("{}/plugin.zip", server.uri())))
            .await
            .unwrap();
        let leased = h.queue.next_tasks(1).await.unwrap().remove(0);

        let outcome = h.worker.handle(leased).await.unwrap();

        let checksum = crate::source::combined_checksum(&[crate::source::sha256_hex(
            b"<?php echo 'hello';",
        )]);
        assert_eq!(outcome, Outcome::Completed { checksum: checksum.clone() });
        assert!(h.queue.get(&id).await.unwrap().is_none());

        let payload = std::fs::read(h.temp.path().join("payloads").join(format!("{}.json", checksum))).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["checksum"], checksum.as_str());
        assert_eq!(json["title"], "Plugin");
        assert_eq!(std::fs::read_dir(h.temp.path().join("work")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_handle_requeues_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let h = harness(3);
        let id = h
            .queue
            .send_task(Task::new("Plugin", format!("{}/plugin.zip", server.uri())))
            .await
            .unwrap();
        let leased = h.queue.next_tasks(1).await.unwrap().remove(0);

        let outcome = h.worker.handle(leased).await.unwrap();

        assert!(matches!(outcome, Outcome::Requeued { .. }));
        let doc = h.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.retries, 1);
        assert!(doc.last_error.unwrap().contains("503"));
        assert_eq!(h.queue.next_tasks(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_dead_letters_on_last_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let h = harness(1);
        let id = h
            .queue
            .send_task(Task::new("Plugin", format!("{}/plugin.zip", server.uri())))
            .await
            .unwrap();
        let leased = h.queue.next_tasks(1).await.unwrap().remove(0);
        assert!(leased.last_attempt);

        let outcome = h.worker.handle(leased).await.unwrap();

        assert!(matches!(outcome, Outcome::DeadLettered { .. }));
        assert!(h.queue.get(&id).await.unwrap().is_some());
        assert!(h.queue.next_tasks(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_dead_letters_corrupt_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a zip".to_vec()))
            .mount(&server)
            .await;

        let h = harness(3);
        h.queue
            .send_task(Task::new("Plugin", format!("{}/plugin.zip", server.uri())))
            .await
            .unwrap();
        let leased = h.queue.next_tasks(1).await.unwrap().remove(0);

        let outcome = h.worker.handle(leased).await.unwrap();

        assert!(matches!(outcome, Outcome::DeadLettered { .. }));
        assert!(h.queue.next_tasks(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin.zip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(zip_bytes())
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        // A zero lease lets a second poll pick the same task up again
        let h = harness_with_lease(5, Duration::ZERO);
        let id = h
            .queue
            .send_task(Task::new("Plugin", format!("{}/plugin.zip", server.uri())))
            .await
            .unwrap();
        let first = h.queue.next_tasks(1).await.unwrap().remove(0);
        let second = h.queue.next_tasks(1).await.unwrap().remove(0);
        assert_eq!(first.id, second.id);

        let other = Worker::new(1, h.worker.ctx.clone());
        let (a, b) = tokio::join!(h.worker.handle(first), other.handle(second));

        let a = a.unwrap();
        let b = b.unwrap();
        assert!(matches!(a, Outcome::Completed { .. }), "{:?}", a);
        assert_eq!(a, b);
        assert!(h.queue.get(&id).await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(h.temp.path().join("work")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let h = harness(3);
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), h.worker.clone().run(rx, CancellationToken::new()))
            .await
            .unwrap();
    }
}
