use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::phpcompat::{self, PhpCompat};
use super::pipeline::{AuditPipeline, Stage};
use super::{PostProcessor, Processor};

pub type ProcessorFactory = Arc<dyn Fn() -> Box<dyn Processor> + Send + Sync>;
pub type PostProcessorFactory = Arc<dyn Fn() -> Box<dyn PostProcessor> + Send + Sync>;

/// Registry mapping processor kinds to factories.
///
/// Processors keep the order they were registered in. Every `build` yields
/// fresh instances so no processor state crosses task boundaries.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: Vec<(String, ProcessorFactory)>,
    post_processors: BTreeMap<String, Vec<PostProcessorFactory>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor; an existing registration of the same kind is replaced in place
    pub fn register<F, P>(&mut self, kind: impl Into<String>, make: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Processor + 'static,
    {
        let kind = kind.into();
        let factory: ProcessorFactory = Arc::new(move || Box::new(make()) as Box<dyn Processor>);
        match self.processors.iter_mut().find(|(existing, _)| *existing == kind) {
            Some(slot) => slot.1 = factory,
            None => self.processors.push((kind, factory)),
        }
    }

    /// Register a post-processor fed by the processor of `parent_kind`
    pub fn register_post<F, P>(&mut self, parent_kind: impl Into<String>, make: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: PostProcessor + 'static,
    {
        let factory: PostProcessorFactory =
            Arc::new(move || Box::new(make()) as Box<dyn PostProcessor>);
        self.post_processors
            .entry(parent_kind.into())
            .or_default()
            .push(factory);
    }

    pub fn has_processor(&self, kind: &str) -> bool {
        self.processors.iter().any(|(existing, _)| existing == kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.processors.iter().map(|(kind, _)| kind.as_str()).collect()
    }

    /// Fresh pipeline for one task
    pub fn build(&self) -> AuditPipeline {
        let mut pipeline = AuditPipeline::default();

        for (kind, factory) in &self.processors {
            let mut stage = Stage::new(factory());
            if let Some(posts) = self.post_processors.get(kind) {
                stage.post_processors = posts.iter().map(|make| make()).collect();
            }
            pipeline.push(stage);
        }

        for parent in self.post_processors.keys() {
            if !self.has_processor(parent) {
                warn!(parent = %parent, "Post-processors registered without their parent processor");
            }
        }

        pipeline
    }

    /// Registry with the built-in post-processors.
    ///
    /// Parent analysis processors wrap external tools and are registered by
    /// the embedding application.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_post(phpcompat::KIND, PhpCompat::new);
        registry
    }
}
