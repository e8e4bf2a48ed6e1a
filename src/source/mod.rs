//! Source archive retrieval
//!
//! A [`SourceFetcher`] materialises a task's remote archive on local disk and
//! content-addresses it:
//!
//! - [`HttpClient`] streams the archive to disk
//! - [`archive::unzip`] extracts every entry while hashing it
//! - [`checksum::combined_checksum`] folds the per-file digests into the
//!   package checksum
//!
//! File operations go through an [`ExtractFs`] strategy so tests can
//! substitute failing implementations.

pub mod archive;
pub mod checksum;
pub mod fs;
pub mod http;

pub use checksum::{combined_checksum, sha256_hex};
pub use fs::{CopyTarget, ExtractFs, StdFs};
pub use http::{HttpClient, HttpConfig};
pub use archive::{Extracted, ZipSource, unzip};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Extraction task failed: {0}")]
    Join(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Network hiccups worth another attempt within one download
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Request(_) | SourceError::Timeout => true,
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Handle over a task's source package
#[async_trait]
pub trait SourceFetcher: Send {
    /// Download, extract and checksum into `destination` as one unit.
    ///
    /// On error the handle records nothing.
    async fn prepare_files(&mut self, destination: &Path) -> Result<()>;

    /// Combined checksum recorded by the last successful `prepare_files`
    fn checksum(&self) -> &str;

    /// Extracted file paths recorded by the last successful `prepare_files`
    fn files(&self) -> &[PathBuf];
}
