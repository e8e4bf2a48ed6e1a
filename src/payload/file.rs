use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PayloadError, PayloadSender, Result};

/// Writes payloads to local files
#[derive(Debug, Clone, Default)]
pub struct FilePayload {
    cancel: Option<CancellationToken>,
}

impl FilePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandon sends once `token` is cancelled
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { cancel: Some(token) }
    }

    fn check_cancelled(&self, destination: &Path) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => {
                warn!(?destination, "Payload send cancelled");
                Err(PayloadError::Cancelled)
            }
            _ => Ok(()),
        }
    }
}

/// Sibling path a payload is written to before it replaces `destination`
fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload".to_string());
    destination.with_file_name(format!(".{}.{}.partial", name, Uuid::new_v4()))
}

impl FilePayload {
    async fn write_staged(&self, staging: &Path, destination: &Path, payload: &[u8]) -> Result<()> {
        let mut file = tokio::fs::File::create(staging).await?;
        file.write_all(payload).await?;
        file.flush().await?;
        drop(file);

        self.check_cancelled(destination)?;
        tokio::fs::rename(staging, destination).await?;
        Ok(())
    }
}

#[async_trait]
impl PayloadSender for FilePayload {
    /// Write `payload` to `destination`.
    ///
    /// The bytes land in a staging file that is renamed over the destination
    /// only once fully written, so a failed or cancelled send leaves any
    /// earlier payload intact.
    async fn send_payload(&self, destination: &Path, payload: &[u8]) -> Result<Vec<u8>> {
        self.check_cancelled(destination)?;

        let staging = staging_path(destination);
        if let Err(e) = self.write_staged(&staging, destination, payload).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }

        debug!(?destination, size = payload.len(), "Payload written");
        Ok(b"ok".to_vec())
    }
}
