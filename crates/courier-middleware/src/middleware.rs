//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all pipeline stages
//! implement. A stage receives the [`MessageContext`] of the message being
//! processed, may read or write any of its fields, and returns once its work
//! is done. Stages run strictly in the order the pipeline holds them.
//!
//! # Status checks
//!
//! The pipeline never skips a stage because of the message status. Each stage
//! inspects the status itself; a stage that only makes sense for messages still
//! in flight (for example the handler executor) must no-op once the status is
//! terminal.
//!
//! # Example
//!
//! ```
//! use courier_middleware::{BoxFuture, Middleware};
//! use courier_core::{MessageContext, PipelineResult};
//!
//! struct AuditTrail;
//!
//! impl Middleware for AuditTrail {
//!     fn name(&self) -> &'static str {
//!         "audit_trail"
//!     }
//!
//!     fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
//!         Box::pin(async move {
//!             ctx.set_item("seen_by", "audit_trail".to_string());
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use courier_core::{MessageContext, PipelineResult};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// # Invariants
///
/// - `name` is stable and unique within one pipeline
/// - Returning `Err` aborts the chain; use it for infrastructure failures only.
///   Handler outcomes are recorded on the context instead.
/// - A middleware reporting `supports_async() == false` must complete without
///   suspending
pub trait Middleware: Send + Sync + 'static {
    /// Returns the stable identifier of this stage.
    fn name(&self) -> &'static str;

    /// Returns `true` if this stage may suspend while processing.
    fn supports_async(&self) -> bool {
        true
    }

    /// Processes the message context.
    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>>;
}

/// A synchronous middleware built from a closure.
///
/// # Example
///
/// ```
/// use courier_middleware::FnMiddleware;
///
/// let stamp = FnMiddleware::new("stamp", |ctx| {
///     ctx.message_mut().data_mut().insert("stamped".into(), "yes".into());
///     Ok(())
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut MessageContext) -> PipelineResult<()> + Send + Sync + 'static,
{
    /// Creates a new function-based middleware.
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut MessageContext) -> PipelineResult<()> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        let result = (self.func)(ctx);
        Box::pin(std::future::ready(result))
    }
}

impl<F> std::fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
