//! HTTP client for downloading source archives

use bytes::Bytes;
use reqwest::Client;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use super::fs::{CopyTarget, ExtractFs};
use super::{Result, SourceError};
use crate::config::FetchConfig;

/// Upper bound for the delay between download attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Body chunks buffered between the network and the file writer
const WRITE_QUEUE: usize = 16;

/// Exponential backoff before retry `attempt + 1`: 1s, 2s, 4s, ... capped
fn backoff(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for HttpConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries.max(1),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Archive downloader
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Stream `url` into `destination`, retrying transient failures
    pub async fn download_to(
        &self,
        url: &str,
        destination: &Path,
        fs: Arc<dyn ExtractFs>,
    ) -> Result<u64> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.download_once(url, destination, fs.clone()).await {
                Ok(size) => {
                    if attempts > 1 {
                        debug!(url, attempts, "Download succeeded after retry");
                    }
                    return Ok(size);
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(destination).await;

                    if !e.is_transient() || attempts >= self.config.max_retries {
                        warn!(url, attempts, error = %e, "Download failed");
                        return Err(e);
                    }

                    warn!(url, attempts, error = %e, "Download failed, retrying");

                    tokio::time::sleep(backoff(attempts)).await;
                }
            }
        }
    }

    async fn download_once(&self, url: &str, destination: &Path, fs: Arc<dyn ExtractFs>) -> Result<u64> {
        debug!(url, "Starting download");

        let mut response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout
            } else if e.is_builder() {
                SourceError::InvalidUrl(url.to_string())
            } else {
                SourceError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // File writes run on the blocking pool, fed chunk by chunk
        let (tx, mut rx) = mpsc::channel::<Bytes>(WRITE_QUEUE);
        let path = destination.to_path_buf();
        let writer = spawn_blocking(move || -> Result<u64> {
            let mut file = fs.create_archive_file(&path)?;
            let mut written = 0u64;
            while let Some(chunk) = rx.blocking_recv() {
                written += fs.copy(CopyTarget::Download, &mut chunk.as_ref(), &mut *file)?;
            }
            file.flush()?;
            Ok(written)
        });

        let mut body = Ok(());
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    // A closed channel means the writer failed; its error is reported below
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    body = Err(SourceError::Request(format!("Failed to read body: {}", e)));
                    break;
                }
            }
        }
        drop(tx);

        let written = writer.await.map_err(|e| SourceError::Join(e.to_string()))??;
        body?;

        debug!(url, size = written, "Download completed");
        Ok(written)
    }
}
