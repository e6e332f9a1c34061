//! Command pipeline.
//!
//! A command is processed by exactly one handler. A command nobody handles
//! fails with `PipelineError::HandlerNotFound`; when several handlers match,
//! the first registered one runs.
//!
//! ```
//! use courier_core::HandlerResult;
//! use courier_middleware::handlers::{ContainerRegistration, HandlerModule, HandlerRegistry, HandlesSync};
//! use courier_middleware::{CommandPipeline, PipelineOptions};
//! use courier_core::di::NullResolver;
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize)]
//! struct Register {
//!     email: String,
//!     user_id: Option<u64>,
//! }
//!
//! #[derive(Default)]
//! struct UserHandlers;
//!
//! impl HandlesSync<Register> for UserHandlers {
//!     fn handle(&self, command: &mut Register, _params: ()) -> HandlerResult {
//!         command.user_id = Some(42);
//!         Ok(())
//!     }
//! }
//!
//! let registry = HandlerRegistry::builder()
//!     .module(HandlerModule::new("users").container(
//!         ContainerRegistration::<UserHandlers>::from_default()
//!             .marked()
//!             .method_sync::<Register, ()>("Handle"),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let commands = CommandPipeline::new(
//!     Arc::new(registry),
//!     PipelineOptions::default(),
//!     Arc::new(NullResolver),
//! )
//! .unwrap();
//!
//! let done = commands
//!     .handle(Register { email: "a@b.c".into(), user_id: None })
//!     .unwrap();
//! assert_eq!(done.user_id, Some(42));
//! ```

use crate::handlers::HandlerRegistry;
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use courier_core::di::DependencyResolver;
use courier_core::{CancellationToken, MessageKind, Payload, PipelineError, PipelineResult};
use std::sync::Arc;

/// Pipeline for commands.
#[derive(Debug)]
pub struct CommandPipeline {
    pipeline: Pipeline,
}

impl CommandPipeline {
    /// Creates a command pipeline with the dispatch and telemetry stages.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the chain cannot be built.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        options: PipelineOptions,
        resolver: Arc<dyn DependencyResolver>,
    ) -> PipelineResult<Self> {
        Pipeline::builder("commands")
            .accept(MessageKind::Command)
            .options(options)
            .resolver(resolver)
            .dispatch(registry)
            .telemetry()
            .build()
            .and_then(Self::from_pipeline)
    }

    /// Wraps a pipeline that accepts commands.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the pipeline refuses commands.
    pub fn from_pipeline(pipeline: Pipeline) -> PipelineResult<Self> {
        if !pipeline.accepts(MessageKind::Command) {
            return Err(PipelineError::configuration(format!(
                "pipeline '{}' does not accept commands",
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

    /// Handles a command, blocking until it completes, and returns the payload.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub fn handle<T: Payload>(&self, command: T) -> PipelineResult<T> {
        crate::blocking::block_on(self.handle_async(command))
    }

    /// Handles a command and returns the payload.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn handle_async<T: Payload>(&self, command: T) -> PipelineResult<T> {
        self.pipeline
            .process_async(MessageKind::Command, command, None)
            .await
    }

    /// Handles a command, threading `cancellation` to handlers that take one.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn handle_with_cancellation<T: Payload>(
        &self,
        command: T,
        cancellation: CancellationToken,
    ) -> PipelineResult<T> {
        self.pipeline
            .process_async(MessageKind::Command, command, Some(cancellation))
            .await
    }
}
