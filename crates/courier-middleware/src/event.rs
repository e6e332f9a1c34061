//! Event pipeline.
//!
//! Every matching handler reacts to a raised event, in registration order,
//! followed by the event itself when it is self-handling. An event nobody
//! handles completes without error.

use crate::handlers::HandlerRegistry;
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use courier_core::di::DependencyResolver;
use courier_core::{CancellationToken, MessageKind, Payload, PipelineError, PipelineResult};
use std::sync::Arc;

/// Pipeline for events.
#[derive(Debug)]
pub struct EventPipeline {
    pipeline: Pipeline,
}

impl EventPipeline {
    /// Creates an event pipeline with the dispatch and telemetry stages.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the chain cannot be built.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        options: PipelineOptions,
        resolver: Arc<dyn DependencyResolver>,
    ) -> PipelineResult<Self> {
        Pipeline::builder("events")
            .accept(MessageKind::Event)
            .options(options)
            .resolver(resolver)
            .dispatch(registry)
            .telemetry()
            .build()
            .and_then(Self::from_pipeline)
    }

    /// Wraps a pipeline that accepts events.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the pipeline refuses events.
    pub fn from_pipeline(pipeline: Pipeline) -> PipelineResult<Self> {
        if !pipeline.accepts(MessageKind::Event) {
            return Err(PipelineError::configuration(format!(
                "pipeline '{}' does not accept events",
                pipeline.name()
            )));
        }
        Ok(Self { pipeline })
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the underlying pipeline for chain editing.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Raises an event, blocking until every handler ran.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub fn raise<T: Payload>(&self, event: T) -> PipelineResult<T> {
        crate::blocking::block_on(self.raise_async(event))
    }

    /// Raises an event.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn raise_async<T: Payload>(&self, event: T) -> PipelineResult<T> {
        self.pipeline.process_async(MessageKind::Event, event, None).await
    }

    /// Raises an event, threading `cancellation` to handlers that take one.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn raise_with_cancellation<T: Payload>(
        &self,
        event: T,
        cancellation: CancellationToken,
    ) -> PipelineResult<T> {
        self.pipeline
            .process_async(MessageKind::Event, event, Some(cancellation))
            .await
    }
}
