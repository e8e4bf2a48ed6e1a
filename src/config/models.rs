use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
}

/// Task queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Tasks whose retry count reaches this ceiling are no longer polled
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Documents leased per poll
    #[serde(default = "default_poll_limit")]
    pub poll_limit: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a leased task stays invisible to other pollers
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            fjall_path: default_fjall_path(),
            collection: default_collection(),
            max_retries: default_max_retries(),
            poll_limit: default_poll_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_secs: default_lease_secs(),
        }
    }
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/queue")
}

fn default_collection() -> String {
    "audit-tasks".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_limit() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_lease_secs() -> u64 {
    600
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageKind,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Filesystem root for the local provider
    pub root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageKind::Memory,
            bucket: default_bucket(),
            root: None,
        }
    }
}

fn default_bucket() -> String {
    "auditbox-reports".to_string()
}

/// Archive download configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_retries")]
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            max_retries: default_fetch_retries(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_user_agent() -> String {
    concat!("auditbox/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_fetch_retries() -> u32 {
    3
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// Per-task working directories are created below this path
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Health and metrics endpoint
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            channel_size: default_channel_size(),
            work_dir: default_work_dir(),
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_num_workers() -> usize {
    4
}

fn default_channel_size() -> usize {
    16
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("auditbox")
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Payload delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayloadConfig {
    /// Directory the file transport writes `<checksum>.json` payloads into
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
        }
    }
}

fn default_destination() -> PathBuf {
    PathBuf::from("data/payloads")
}
