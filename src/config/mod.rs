//! Configuration management for auditbox
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use auditbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Polling collection: {}", config.queue.collection);
//! ```
//!
//! # Environment Variables
//!
//! Overrides follow the pattern `AUDITBOX__<section>__<key>`, e.g.
//! `AUDITBOX__QUEUE__MAX_RETRIES=5` or `AUDITBOX__STORAGE__PROVIDER=local`.
//!
//! The file defaults to `config/auditbox.toml` and can be moved with the
//! `AUDITBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, FetchConfig, PayloadConfig, QueueConfig, StorageConfig, StorageKind, WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
