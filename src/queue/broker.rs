use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::store::Result;
use super::tasks::{LeasedTask, TaskQueue};
use crate::observability::Metrics;

/// TaskDispatcher polls the queue and feeds the worker pool
///
/// Flow:
/// 1. `dispatch_once` leases up to `poll_limit` tasks from the TaskQueue
/// 2. Each leased task goes to the next worker channel (round-robin)
/// 3. Bounded channels apply backpressure: a full pool stalls polling
/// 4. A task whose worker channel is closed is released back to the queue
pub struct TaskDispatcher {
    queue: Arc<TaskQueue>,
    worker_channels: Vec<mpsc::Sender<LeasedTask>>,
    next_worker: AtomicUsize,
    poll_limit: usize,
    metrics: Arc<Metrics>,
}

impl TaskDispatcher {
    /// Create a dispatcher and one receiver per worker
    pub fn new(
        queue: Arc<TaskQueue>,
        num_workers: usize,
        channel_size: usize,
        poll_limit: usize,
        metrics: Arc<Metrics>,
    ) -> (Self, Vec<mpsc::Receiver<LeasedTask>>) {
        info!(
            num_workers,
            channel_size, "Creating TaskDispatcher with worker channels"
        );

        let mut worker_channels = Vec::with_capacity(num_workers);
        let mut worker_receivers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size);
            worker_channels.push(tx);
            worker_receivers.push(rx);
            debug!(worker_id, "Created worker channel");
        }

        let dispatcher = Self {
            queue,
            worker_channels,
            next_worker: AtomicUsize::new(0),
            poll_limit,
            metrics,
        };

        (dispatcher, worker_receivers)
    }

    /// Poll once and hand every leased task to a worker.
    ///
    /// Returns the number of tasks delivered.
    pub async fn dispatch_once(&self) -> Result<usize> {
        let leased = self.queue.next_tasks(self.poll_limit).await?;
        let mut delivered = 0;

        for task in leased {
            self.metrics.task_leased();
            let worker_idx =
                self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();

            match self.worker_channels[worker_idx].send(task).await {
                Ok(()) => {
                    debug!(worker_idx, "Task sent to worker");
                    delivered += 1;
                }
                Err(mpsc::error::SendError(task)) => {
                    warn!(worker_idx, task_id = ?task.id, "Worker channel closed, releasing task");
                    if let Some(id) = &task.id {
                        self.queue.release(id, "worker unavailable").await?;
                    }
                }
            }
        }

        Ok(delivered)
    }

    /// Poll until cancelled, sleeping `interval` whenever a poll comes back empty
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        info!(collection = %self.queue.collection(), "Dispatcher started");

        loop {
            let delivered = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.dispatch_once() => match result {
                    Ok(n) => n,
                    Err(e) => {
                        error!(error = %e, "Poll failed");
                        0
                    }
                },
            };

            if delivered == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Get number of workers
    pub fn num_workers(&self) -> usize {
        self.worker_channels.len()
    }

    /// Check if all worker channels are healthy (not closed)
    pub fn health_check(&self) -> bool {
        self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FjallDocumentStore;
    use crate::task::Task;
    use tempfile::TempDir;

    fn create_queue() -> (Arc<TaskQueue>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallDocumentStore::open(temp_dir.path()).unwrap());
        let queue = TaskQueue::with_settings(store, "audit-tasks", 3, Duration::from_secs(600));
        (Arc::new(queue), temp_dir)
    }

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let (queue, _temp) = create_queue();
        let metrics = Arc::new(Metrics::new());
        let (dispatcher, mut receivers) = TaskDispatcher::new(queue.clone(), 3, 10, 10, metrics.clone());

        for i in 0..6 {
            queue
                .send_task(Task::new(format!("task{}", i), "http://x/a.zip"))
                .await
                .unwrap();
        }

        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 6);
        assert_eq!(metrics.snapshot().tasks_leased, 6);

        // Worker 0 gets tasks 0, 3; worker 1 gets 1, 4; worker 2 gets 2, 5
        for worker_id in 0..3 {
            let first = receivers[worker_id].recv().await.unwrap();
            let second = receivers[worker_id].recv().await.unwrap();
            assert_eq!(first.task.title, format!("task{}", worker_id));
            assert_eq!(second.task.title, format!("task{}", worker_id + 3));
        }
    }

    #[tokio::test]
    async fn test_closed_worker_releases_task() {
        let (queue, _temp) = create_queue();
        let (dispatcher, receivers) = TaskDispatcher::new(queue.clone(), 1, 10, 10, Arc::new(Metrics::new()));
        drop(receivers);
        assert!(!dispatcher.health_check());

        let id = queue.send_task(Task::new("orphan", "http://x/a.zip")).await.unwrap();
        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);

        let doc = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.lease_until, 0);
        assert_eq!(doc.last_error.as_deref(), Some("worker unavailable"));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (queue, _temp) = create_queue();
        let (dispatcher, _receivers) = TaskDispatcher::new(queue, 2, 10, 10, Arc::new(Metrics::new()));
        assert_eq!(dispatcher.num_workers(), 2);

        let cancel = CancellationToken::new();
        cancel.cancel();
        dispatcher.run(Duration::from_millis(10), cancel).await;
    }
}
