//! Crate-level error aggregating the module errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::payload::PayloadError;
use crate::queue::QueueError;
use crate::source::SourceError;
use crate::storage::StorageError;

/// Failure class used to decide between requeueing and dead-lettering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Download or upload failed in flight
    Transport,
    /// Malformed archive, report or configuration
    Validation,
    /// Required context missing
    State,
    /// Document store or storage provider failure
    Provider,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Missing context: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Queue(e) => match e {
                QueueError::Serialization(_) | QueueError::InvalidPath(_) | QueueError::Rejected(_) => {
                    ErrorKind::Validation
                }
                QueueError::NotFound(_) | QueueError::Closed => ErrorKind::State,
                QueueError::Fjall(_) | QueueError::Provider(_) => ErrorKind::Provider,
            },
            Error::Source(e) => match e {
                SourceError::Request(_) | SourceError::HttpStatus { .. } | SourceError::Timeout => {
                    ErrorKind::Transport
                }
                SourceError::InvalidUrl(_) | SourceError::InvalidArchive(_) => ErrorKind::Validation,
                SourceError::Join(_) | SourceError::Io(_) => ErrorKind::Io,
            },
            Error::Storage(e) => match e {
                StorageError::UploadFailed(_) => ErrorKind::Transport,
                StorageError::InvalidConfig(_) => ErrorKind::Validation,
                StorageError::NotFound(_) | StorageError::ObjectStoreError(_) => ErrorKind::Provider,
                StorageError::Io(_) => ErrorKind::Io,
            },
            Error::Payload(e) => match e {
                PayloadError::Serialization(_) => ErrorKind::Validation,
                PayloadError::Cancelled => ErrorKind::State,
                PayloadError::Io(_) => ErrorKind::Io,
            },
            Error::Config(_) => ErrorKind::Validation,
            Error::State(_) => ErrorKind::State,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether another attempt at the same task could succeed.
    ///
    /// A client-side HTTP status other than 408/429 will not change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Source(SourceError::HttpStatus { status, .. }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Error::Payload(PayloadError::Cancelled) => true,
            _ => matches!(
                self.kind(),
                ErrorKind::Transport | ErrorKind::Provider | ErrorKind::Io
            ),
        }
    }
}
