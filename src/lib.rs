pub mod audit;
pub mod config;
pub mod error;
pub mod observability;
pub mod payload;
pub mod queue;
pub mod server;
pub mod source;
pub mod storage;
pub mod task;
pub mod worker;

pub use error::{Error, ErrorKind, Result};
