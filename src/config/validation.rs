use super::models::{Config, StorageKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Queue collection name must not be empty")]
    EmptyCollection,

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("Storage provider is local but no root directory is configured")]
    MissingStorageRoot,

    #[error("Storage bucket must not be empty")]
    EmptyBucket,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_queue(config)?;
    validate_worker(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    let queue = &config.queue;

    if queue.collection.trim().is_empty() {
        return Err(ValidationError::EmptyCollection);
    }
    if queue.max_retries == 0 {
        return Err(ValidationError::NotPositive {
            field: "queue.max_retries",
        });
    }
    if queue.poll_limit == 0 {
        return Err(ValidationError::NotPositive {
            field: "queue.poll_limit",
        });
    }
    if queue.lease_secs == 0 {
        return Err(ValidationError::NotPositive {
            field: "queue.lease_secs",
        });
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.num_workers == 0 {
        return Err(ValidationError::NotPositive {
            field: "worker.num_workers",
        });
    }
    if config.worker.channel_size == 0 {
        return Err(ValidationError::NotPositive {
            field: "worker.channel_size",
        });
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.bucket.is_empty() {
        return Err(ValidationError::EmptyBucket);
    }
    if config.storage.provider == StorageKind::Local && config.storage.root.is_none() {
        return Err(ValidationError::MissingStorageRoot);
    }
    Ok(())
}
