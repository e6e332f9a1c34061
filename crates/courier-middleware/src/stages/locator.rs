//! Handler location.
//!
//! Commands and events are matched against the handler registry by payload
//! type and, for generic payloads, by generic signature. Queries target the
//! query object type captured by the query builder.
//!
//! | Kind | No handler | Several handlers |
//! |------|------------|------------------|
//! | Command | fails with `HandlerNotFound` | the first one wins |
//! | Event | completes with nothing to run | all of them run |
//! | Query | n/a (always one target) | n/a |

use crate::handlers::{ContainerInfo, HandlerDescriptor, HandlerRegistry};
use crate::middleware::{BoxFuture, Middleware};
use crate::options::PipelineOptions;
use crate::query::QueryInvocation;
use crate::stages::record_failure;
use courier_core::{
    GenericSignature, MessageContext, MessageKind, PipelineError, PipelineResult,
    ProcessingStatus,
};
use std::sync::Arc;

/// Handlers located for the message in flight.
#[derive(Debug, Clone)]
pub struct LocatedHandlers(pub(crate) Arc<[HandlerDescriptor]>);

impl LocatedHandlers {
    /// Returns the located handlers in invocation order.
    #[must_use]
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        &self.0
    }
}

/// Finds the handlers for each message.
#[derive(Debug, Clone)]
pub struct LocatorMiddleware {
    registry: Arc<HandlerRegistry>,
    options: Arc<PipelineOptions>,
}

impl LocatorMiddleware {
    /// Creates a locator over `registry`.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>, options: Arc<PipelineOptions>) -> Self {
        Self { registry, options }
    }

    fn locate(&self, ctx: &mut MessageContext) -> PipelineResult<()> {
        if ctx.status() != ProcessingStatus::Processing {
            return Ok(());
        }

        let located: Arc<[HandlerDescriptor]> = if ctx.kind() == MessageKind::Query {
            let invocation = ctx.extension::<QueryInvocation>().ok_or_else(|| {
                PipelineError::configuration("query message carries no query expression")
            })?;
            let container = self
                .registry
                .container(invocation.target())
                .unwrap_or_else(|| {
                    Arc::new(ContainerInfo::external(
                        invocation.target(),
                        invocation.type_name(),
                    ))
                });
            Arc::from(vec![HandlerDescriptor::query(container)])
        } else {
            let payload = ctx.message().content();
            let signature = self
                .options
                .content_types
                .signature_of(payload)
                .cloned()
                .or_else(|| GenericSignature::parse(payload.type_name()));
            self.registry.locate(payload, signature.as_ref())
        };

        if located.is_empty() {
            if ctx.kind() == MessageKind::Event {
                tracing::debug!(
                    message_id = %ctx.message_id(),
                    content_type = ctx.content_type(),
                    "no event handlers"
                );
                ctx.set_extension(LocatedHandlers(located));
                return Ok(());
            }
            let error = PipelineError::handler_not_found(ctx.content_type(), ctx.kind());
            return record_failure(ctx, &self.options, error);
        }

        let located = if ctx.kind() == MessageKind::Command && located.len() > 1 {
            tracing::warn!(
                content_type = ctx.content_type(),
                candidates = located.len(),
                chosen = ?located[0],
                "several command handlers found; using the first"
            );
            Arc::from(&located[..1])
        } else {
            located
        };

        tracing::trace!(
            message_id = %ctx.message_id(),
            handlers = located.len(),
            "handlers located"
        );
        ctx.set_extension(LocatedHandlers(located));
        Ok(())
    }
}

impl Middleware for LocatorMiddleware {
    fn name(&self) -> &'static str {
        "handler_locator"
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(std::future::ready(self.locate(ctx)))
    }
}
