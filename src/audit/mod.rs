//! Audit processors and the pipeline that chains them
//!
//! ## Key Components
//!
//! - [`Processor`] - analysis step writing into a [`ResultBag`]
//! - [`PostProcessor`] - step consuming its parent's raw report
//! - [`PhpCompat`] - PHP version-compatibility post-processor
//! - [`ProcessorRegistry`] - factories producing one [`AuditPipeline`] per task
//!
//! Processors never fail the pipeline: a failure is recorded in the bag under
//! the processor's kind and appended to the affected [`AuditResult`].

pub mod phpcompat;
pub mod phpcs;
mod pipeline;
mod registry;
pub mod result;
pub mod versions;

pub use phpcompat::PhpCompat;
pub use phpcs::{PhpcsFile, PhpcsMessage, PhpcsResults, PhpcsTotals};
pub use pipeline::{AuditPipeline, Stage};
pub use registry::{PostProcessorFactory, ProcessorFactory, ProcessorRegistry};
pub use result::{
    AuditDetails, AuditResult, AuditSummary, ClocResult, CodeInfo, DetailsRef, InfoDetails,
    ResultBag,
};

use async_trait::async_trait;
use std::io::Read;

use crate::task::Task;

/// Analysis step identified by a stable kind
#[async_trait]
pub trait Processor: Send + Sync {
    fn kind(&self) -> &str;

    /// Run against `task`, recording outcomes and failures in `bag`
    async fn process(&mut self, task: &Task, bag: &mut ResultBag);

    /// Raw report produced by the last `process`, if any
    fn raw_report(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Processor fed with the raw output of a parent processor
pub trait PostProcessor: Processor {
    fn set_report(&mut self, report: Box<dyn Read + Send + Sync>);

    /// Bind the parent; only its kind is retained
    fn set_parent(&mut self, parent: &dyn Processor);
}

/// Whether the bag's requested audits include `processor`'s kind
pub fn can_run_audit<P: Processor + ?Sized>(processor: &P, bag: &ResultBag) -> bool {
    bag.audits()
        .is_some_and(|audits| audits.iter().any(|kind| kind == processor.kind()))
}
