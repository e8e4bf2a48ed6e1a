//! Audit worker pool
//!
//! Each worker receives leased tasks from its dispatcher channel and drives
//! them through fetch, audit, ship and settle.

pub mod runner;

pub use runner::{Outcome, Worker, WorkerContext};
