//! Ordered, editable middleware pipeline.
//!
//! A [`Pipeline`] owns an ordered chain of middlewares and the set of message
//! kinds it accepts. The chain is edited during setup (append, insert before or
//! after an identifier, remove) and then shared by every invocation.
//!
//! ## Execution model
//!
//! ```text
//! begin → stage 1 → stage 2 → ... → stage N → surface recorded failure
//! ```
//!
//! - Stages run strictly in chain order. The pipeline never skips a stage
//!   because of the message status; each stage checks the status itself.
//! - A stage returning `Err` aborts the chain. The message is marked failed
//!   (unless already terminal) and the error is returned.
//! - Handler failures are recorded on the context by the executor and are
//!   returned once the whole chain has run.
//! - [`Pipeline::invoke`] blocks on the same future [`Pipeline::invoke_async`]
//!   awaits. Stages reporting `supports_async() == false` are polled once and
//!   must complete without suspending.
//!
//! # Example
//!
//! ```
//! use courier_core::{Message, MessageKind, PipelineError};
//! use courier_middleware::{FnMiddleware, Pipeline};
//! use std::sync::Arc;
//!
//! let mut pipeline = Pipeline::builder("events")
//!     .accept(MessageKind::Event)
//!     .stage(FnMiddleware::new("first", |_ctx| Ok(())))
//!     .build()
//!     .unwrap();
//!
//! pipeline
//!     .insert_after("first", Arc::new(FnMiddleware::new("second", |_ctx| Ok(()))))
//!     .unwrap();
//! assert_eq!(pipeline.identifiers(), vec!["first", "second"]);
//!
//! let duplicate = pipeline.append(Arc::new(FnMiddleware::new("first", |_ctx| Ok(()))));
//! assert!(matches!(duplicate, Err(PipelineError::Configuration(_))));
//! ```

use crate::handlers::HandlerRegistry;
use crate::middleware::Middleware;
use crate::options::PipelineOptions;
use crate::stages::{ExecutorMiddleware, LocatorMiddleware, ResolverMiddleware, TelemetryMiddleware};
use courier_core::di::{DependencyResolver, NullResolver};
use courier_core::{
    CancellationToken, Message, MessageContext, MessageKind, Payload, PipelineError,
    PipelineResult,
};
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;

/// A type-erased middleware that can be stored in the chain.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered middleware chain plus the message kinds it accepts.
pub struct Pipeline {
    name: &'static str,
    kinds: Vec<MessageKind>,
    middlewares: Vec<BoxedMiddleware>,
    options: Arc<PipelineOptions>,
    resolver: Arc<dyn DependencyResolver>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder(name: &'static str) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the accepted message kinds.
    #[must_use]
    pub fn kinds(&self) -> &[MessageKind] {
        &self.kinds
    }

    /// Returns `true` if messages of `kind` may enter this pipeline.
    #[must_use]
    pub fn accepts(&self, kind: MessageKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Returns the pipeline options.
    #[must_use]
    pub fn options(&self) -> &Arc<PipelineOptions> {
        &self.options
    }

    /// Returns the dependency resolver handed to every context.
    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn DependencyResolver> {
        &self.resolver
    }

    /// Returns the stage identifiers in chain order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the index of the stage with the given identifier.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.middlewares.iter().position(|mw| mw.name() == name)
    }

    /// Returns the stage with the given identifier.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoxedMiddleware> {
        self.position(name).map(|index| &self.middlewares[index])
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Appends a stage to the end of the chain.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the identifier is already used.
    pub fn append(&mut self, middleware: BoxedMiddleware) -> PipelineResult<&mut Self> {
        self.ensure_unique(middleware.name())?;
        self.middlewares.push(middleware);
        Ok(self)
    }

    /// Inserts a stage immediately before the stage named `anchor`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the identifier is already used
    /// or `anchor` is not in the chain.
    pub fn insert_before(
        &mut self,
        anchor: &str,
        middleware: BoxedMiddleware,
    ) -> PipelineResult<&mut Self> {
        self.ensure_unique(middleware.name())?;
        let index = self.anchor(anchor)?;
        self.middlewares.insert(index, middleware);
        Ok(self)
    }

    /// Inserts a stage immediately after the stage named `anchor`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the identifier is already used
    /// or `anchor` is not in the chain.
    pub fn insert_after(
        &mut self,
        anchor: &str,
        middleware: BoxedMiddleware,
    ) -> PipelineResult<&mut Self> {
        self.ensure_unique(middleware.name())?;
        let index = self.anchor(anchor)?;
        self.middlewares.insert(index + 1, middleware);
        Ok(self)
    }

    /// Removes the stage with the given identifier and returns it.
    pub fn remove(&mut self, name: &str) -> Option<BoxedMiddleware> {
        self.position(name).map(|index| self.middlewares.remove(index))
    }

    fn ensure_unique(&self, name: &str) -> PipelineResult<()> {
        if self.position(name).is_some() {
            return Err(PipelineError::configuration(format!(
                "pipeline '{}' already contains a middleware named '{}'",
                self.name, name
            )));
        }
        Ok(())
    }

    fn anchor(&self, anchor: &str) -> PipelineResult<usize> {
        self.position(anchor).ok_or_else(|| {
            PipelineError::configuration(format!(
                "pipeline '{}' has no middleware named '{}'",
                self.name, anchor
            ))
        })
    }

    /// Wraps a message into a context bound to this pipeline.
    #[must_use]
    pub fn context(&self, message: Message) -> MessageContext {
        MessageContext::new(message, Arc::clone(&self.resolver)).with_pipeline(self.name)
    }

    /// Wraps a message into a context carrying a caller cancellation token.
    #[must_use]
    pub fn context_with_cancellation(
        &self,
        message: Message,
        cancellation: Option<CancellationToken>,
    ) -> MessageContext {
        let ctx = self.context(message);
        match cancellation {
            Some(token) => ctx.with_cancellation(token),
            None => ctx,
        }
    }

    /// Builds a message for `payload`, named by the registered content type.
    #[must_use]
    pub fn message<T: Payload>(&self, kind: MessageKind, payload: T) -> Message {
        let content_type = self.options.content_types.name_of(&payload);
        Message::new(kind, payload).with_content_type(content_type)
    }

    /// Runs `payload` through the chain and hands it back with handler writes applied.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn process_async<T: Payload>(
        &self,
        kind: MessageKind,
        payload: T,
        cancellation: Option<CancellationToken>,
    ) -> PipelineResult<T> {
        let message = self.message(kind, payload);
        let mut ctx = self.context_with_cancellation(message, cancellation);
        self.invoke_async(&mut ctx).await?;
        ctx.into_message()
            .into_content()
            .downcast::<T>()
            .map(|payload| *payload)
            .ok_or_else(|| PipelineError::invalid_state("payload was replaced during processing"))
    }

    /// Runs the chain, blocking the current thread until it finishes.
    ///
    /// Works with or without an ambient tokio runtime, so handlers may await
    /// tokio timers and I/O either way.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub fn invoke(&self, ctx: &mut MessageContext) -> PipelineResult<()> {
        crate::blocking::block_on(self.invoke_async(ctx))
    }

    /// Runs the chain.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Configuration` if the message kind is not accepted
    /// - `PipelineError::InvalidState` if the message already went through a pipeline
    /// - the first error returned by a stage
    /// - the failure recorded on the context (rejection, missing handler,
    ///   handler error)
    pub async fn invoke_async(&self, ctx: &mut MessageContext) -> PipelineResult<()> {
        if !self.accepts(ctx.kind()) {
            return Err(PipelineError::configuration(format!(
                "pipeline '{}' does not accept {} messages",
                self.name,
                ctx.kind()
            )));
        }

        ctx.begin()?;
        tracing::debug!(
            pipeline = self.name,
            message_id = %ctx.message_id(),
            content_type = ctx.content_type(),
            kind = %ctx.kind(),
            "message entered pipeline"
        );

        for middleware in &self.middlewares {
            let outcome = if middleware.supports_async() {
                middleware.process(ctx).await
            } else {
                middleware.process(ctx).now_or_never().unwrap_or_else(|| {
                    Err(PipelineError::invalid_state(format!(
                        "synchronous middleware '{}' suspended",
                        middleware.name()
                    )))
                })
            };

            if let Err(error) = outcome {
                tracing::warn!(
                    pipeline = self.name,
                    middleware = middleware.name(),
                    message_id = %ctx.message_id(),
                    error = %error,
                    "middleware aborted the chain"
                );
                return Err(self.abort(ctx, error));
            }
        }

        match ctx.take_failure() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn abort(&self, ctx: &mut MessageContext, error: PipelineError) -> PipelineError {
        if ctx.is_terminal() {
            return error;
        }
        let description = self.options.describer.describe_pipeline(&error);
        match ctx.fail(error, description) {
            Ok(()) => ctx
                .take_failure()
                .unwrap_or_else(|| PipelineError::invalid_state("failure vanished from context")),
            Err(state) => state,
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("kinds", &self.kinds)
            .field("stages", &self.identifiers())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    name: &'static str,
    kinds: Vec<MessageKind>,
    middlewares: Vec<BoxedMiddleware>,
    options: PipelineOptions,
    resolver: Arc<dyn DependencyResolver>,
}

impl PipelineBuilder {
    /// Creates a builder for an empty pipeline.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            kinds: Vec::new(),
            middlewares: Vec::new(),
            options: PipelineOptions::default(),
            resolver: Arc::new(NullResolver),
        }
    }

    /// Accepts messages of `kind`.
    #[must_use]
    pub fn accept(mut self, kind: MessageKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    /// Sets the pipeline options.
    #[must_use]
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the dependency resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<M: Middleware>(self, middleware: M) -> Self {
        self.boxed_stage(Arc::new(middleware))
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn boxed_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends the handler locator, resolver and executor stages.
    ///
    /// The stages share the options set so far; set options first.
    #[must_use]
    pub fn dispatch(self, registry: Arc<HandlerRegistry>) -> Self {
        let options = Arc::new(self.options.clone());
        self.stage(LocatorMiddleware::new(registry, Arc::clone(&options)))
            .stage(ResolverMiddleware::new(Arc::clone(&options)))
            .stage(ExecutorMiddleware::new(options))
    }

    /// Appends the telemetry stage.
    #[must_use]
    pub fn telemetry(self) -> Self {
        self.stage(TelemetryMiddleware::new())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if two stages share an identifier.
    pub fn build(self) -> PipelineResult<Pipeline> {
        let mut pipeline = Pipeline {
            name: self.name,
            kinds: self.kinds,
            middlewares: Vec::with_capacity(self.middlewares.len()),
            options: Arc::new(self.options),
            resolver: self.resolver,
        };
        for middleware in self.middlewares {
            pipeline.append(middleware)?;
        }
        Ok(pipeline)
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("kinds", &self.kinds)
            .field("stages", &self.middlewares.iter().map(|mw| mw.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
