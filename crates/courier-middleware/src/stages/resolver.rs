//! Handler resolution.
//!
//! Each located container is obtained in this order:
//!
//! 1. the dependency resolver, which keeps ownership of what it returns
//! 2. the container's registered constructor, binding its parameters
//!    best-effort; the pipeline owns and later disposes what it builds
//! 3. with property resolving enabled, unset injectable properties of the
//!    new instance are filled from the resolver
//!
//! A container that can be obtained neither way fails the message. For a
//! query the failure is reported as `HandlerNotFound`.

use crate::handlers::registry::HandlerTarget;
use crate::handlers::{ContainerInfo, HandlerDescriptor};
use crate::middleware::{BoxFuture, Middleware};
use crate::options::PipelineOptions;
use crate::stages::locator::LocatedHandlers;
use crate::stages::record_failure;
use courier_core::di::Instance;
use courier_core::{MessageContext, MessageKind, PipelineError, PipelineResult, ProcessingStatus};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// One located handler together with its resolved object.
pub(crate) struct ResolvedHandler {
    pub(crate) descriptor: HandlerDescriptor,
    pub(crate) instance: Option<Instance>,
}

/// Handlers ready to run, plus the instances the pipeline must release.
pub(crate) struct ResolvedHandlers {
    pub(crate) handlers: Vec<ResolvedHandler>,
    owned: Vec<(Arc<ContainerInfo>, Instance)>,
}

impl ResolvedHandlers {
    /// Disposes every instance the pipeline constructed itself.
    pub(crate) fn release(&self) {
        for (info, instance) in &self.owned {
            tracing::trace!(container = info.name(), "disposing handler container");
            info.dispose(instance.as_ref());
        }
    }
}

/// Obtains handler objects for the located handlers.
#[derive(Debug, Clone)]
pub struct ResolverMiddleware {
    options: Arc<PipelineOptions>,
}

impl ResolverMiddleware {
    /// Creates a resolver stage.
    #[must_use]
    pub fn new(options: Arc<PipelineOptions>) -> Self {
        Self { options }
    }

    fn resolve(&self, ctx: &mut MessageContext) -> PipelineResult<()> {
        if ctx.status() != ProcessingStatus::Processing {
            return Ok(());
        }

        let located = ctx
            .extension::<LocatedHandlers>()
            .map(|located| Arc::clone(&located.0))
            .ok_or_else(|| {
                PipelineError::configuration(
                    "handler_resolver requires handler_locator earlier in the chain",
                )
            })?;

        let mut instances: HashMap<TypeId, Instance> = HashMap::new();
        let mut resolved = ResolvedHandlers {
            handlers: Vec::with_capacity(located.len()),
            owned: Vec::new(),
        };

        for descriptor in located.iter() {
            let instance = match &descriptor.target {
                HandlerTarget::Message => None,
                HandlerTarget::Container(info) => match instances.get(&info.type_id()) {
                    Some(instance) => Some(Arc::clone(instance)),
                    None => match self.instantiate(ctx, info) {
                        Ok((instance, owned)) => {
                            if owned {
                                resolved.owned.push((Arc::clone(info), Arc::clone(&instance)));
                            }
                            instances.insert(info.type_id(), Arc::clone(&instance));
                            Some(instance)
                        }
                        Err(error) => {
                            resolved.release();
                            return record_failure(ctx, &self.options, error);
                        }
                    },
                },
            };
            resolved.handlers.push(ResolvedHandler {
                descriptor: descriptor.clone(),
                instance,
            });
        }

        ctx.set_extension(resolved);
        Ok(())
    }

    /// Returns the instance and whether the pipeline owns it.
    fn instantiate(
        &self,
        ctx: &MessageContext,
        info: &ContainerInfo,
    ) -> Result<(Instance, bool), PipelineError> {
        let unresolved = match ctx.resolver().resolve(info.type_id(), info.type_name()) {
            Ok(instance) => return Ok((instance, false)),
            Err(error) => error,
        };
        tracing::trace!(
            container = info.name(),
            reason = %unresolved,
            "resolver has no instance; constructing"
        );

        match info.construct(ctx, self.options.use_properties_resolving) {
            Some(Ok(instance)) => Ok((instance, true)),
            Some(Err(error)) => Err(PipelineError::Resolution(error)),
            None if ctx.kind() == MessageKind::Query => Err(PipelineError::handler_not_found(
                ctx.content_type(),
                MessageKind::Query,
            )),
            None => Err(PipelineError::Resolution(unresolved)),
        }
    }
}

impl Middleware for ResolverMiddleware {
    fn name(&self) -> &'static str {
        "handler_resolver"
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(std::future::ready(self.resolve(ctx)))
    }
}
