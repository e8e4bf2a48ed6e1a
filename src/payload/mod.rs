//! Report payload assembly and delivery

mod file;
mod model;

pub use file::FilePayload;
pub use model::{Payload, ReportEntry, build_payload};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload delivery cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PayloadError>;

/// Transport delivering a rendered payload
#[async_trait]
pub trait PayloadSender: Send + Sync {
    /// Deliver `payload` to `destination`, returning the transport's response body
    async fn send_payload(&self, destination: &Path, payload: &[u8]) -> Result<Vec<u8>>;
}
