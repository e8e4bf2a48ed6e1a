//! Worker counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording task outcomes
#[derive(Debug, Default)]
pub struct Metrics {
    tasks_leased: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_requeued: AtomicU64,
    tasks_dead_lettered: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_leased(&self) {
        self.tasks_leased.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_leased", "Metric incremented");
    }

    pub fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_completed", "Metric incremented");
    }

    pub fn task_requeued(&self) {
        self.tasks_requeued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_requeued", "Metric incremented");
    }

    pub fn task_dead_lettered(&self) {
        self.tasks_dead_lettered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_dead_lettered", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_leased: self.tasks_leased.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_requeued: self.tasks_requeued.load(Ordering::Relaxed),
            tasks_dead_lettered: self.tasks_dead_lettered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_leased: u64,
    pub tasks_completed: u64,
    pub tasks_requeued: u64,
    pub tasks_dead_lettered: u64,
}
