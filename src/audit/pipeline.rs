use std::io::Cursor;
use tracing::{debug, info};

use super::{PostProcessor, Processor, ResultBag, can_run_audit};
use crate::task::Task;

/// A processor and the post-processors consuming its report
pub struct Stage {
    pub processor: Box<dyn Processor>,
    pub post_processors: Vec<Box<dyn PostProcessor>>,
}

impl Stage {
    pub fn new(processor: Box<dyn Processor>) -> Self {
        Self {
            processor,
            post_processors: Vec::new(),
        }
    }

    pub fn with_post_processor(mut self, post: Box<dyn PostProcessor>) -> Self {
        self.post_processors.push(post);
        self
    }
}

/// Processor chain for a single task
#[derive(Default)]
pub struct AuditPipeline {
    stages: Vec<Stage>,
}

impl AuditPipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every requested processor in order.
    ///
    /// Stages run in the order they were registered. The task's `audits`
    /// list selects which processors run; its own order is not consulted, so
    /// a parent always precedes the post-processors reading its report.
    ///
    /// A post-processor runs after its parent, receives the parent's raw
    /// report and a parent binding, then processes. A parent that was not
    /// requested leaves its post-processors to report the missing result.
    /// Returns the number of processors invoked.
    pub async fn run(&mut self, task: &Task, bag: &mut ResultBag) -> usize {
        let mut invoked = 0;

        for Stage {
            processor,
            post_processors,
        } in &mut self.stages
        {
            if can_run_audit(processor.as_ref(), bag) {
                info!(kind = processor.kind(), "Running processor");
                processor.process(task, bag).await;
                invoked += 1;
            } else {
                debug!(kind = processor.kind(), "Processor not requested");
            }

            for post in post_processors.iter_mut() {
                if !can_run_audit(post.as_ref(), bag) {
                    debug!(kind = post.kind(), "Post-processor not requested");
                    continue;
                }

                let report = processor.raw_report().unwrap_or_default();
                post.set_report(Box::new(Cursor::new(report)));
                post.set_parent(processor.as_ref());

                info!(kind = post.kind(), parent = processor.kind(), "Running post-processor");
                post.process(task, bag).await;
                invoked += 1;
            }
        }

        invoked
    }
}
