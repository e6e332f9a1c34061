//! Handler execution.
//!
//! Runs every resolved handler in order, awaiting asynchronous ones. The first
//! failing handler stops the run. Handler errors are wrapped into
//! `PipelineError::MessageProcessing` unless the pipeline preserves original
//! errors, in which case `PipelineError::Handler` carries them unmodified.
//! Instances the pipeline constructed are disposed whatever the outcome.

use crate::handlers::registration::InvokeError;
use crate::handlers::HandlerDescriptor;
use crate::middleware::{BoxFuture, Middleware};
use crate::options::PipelineOptions;
use crate::query::QueryInvocation;
use crate::stages::resolver::ResolvedHandlers;
use courier_core::{
    ErrorDescription, MessageContext, PipelineError, PipelineResult, ProcessingStatus,
};
use std::any::Any;
use std::sync::Arc;

/// Invokes the resolved handlers.
#[derive(Debug, Clone)]
pub struct ExecutorMiddleware {
    options: Arc<PipelineOptions>,
}

impl ExecutorMiddleware {
    /// Creates an executor stage.
    #[must_use]
    pub fn new(options: Arc<PipelineOptions>) -> Self {
        Self { options }
    }

    async fn execute(&self, ctx: &mut MessageContext) -> PipelineResult<()> {
        if ctx.status() != ProcessingStatus::Processing {
            if let Some(resolved) = ctx.remove_extension::<ResolvedHandlers>() {
                resolved.release();
            }
            return Ok(());
        }

        let resolved = ctx.remove_extension::<ResolvedHandlers>().ok_or_else(|| {
            PipelineError::configuration(
                "handler_executor requires handler_resolver earlier in the chain",
            )
        })?;

        let outcome = self.run(&resolved, ctx).await;
        resolved.release();

        match outcome {
            Ok(()) => {
                ctx.complete()?;
                tracing::debug!(
                    message_id = %ctx.message_id(),
                    handlers = resolved.handlers.len(),
                    "message handled"
                );
                Ok(())
            }
            Err((error, description)) => ctx.fail(error, description),
        }
    }

    async fn run(
        &self,
        resolved: &ResolvedHandlers,
        ctx: &mut MessageContext,
    ) -> Result<(), (PipelineError, ErrorDescription)> {
        for handler in &resolved.handlers {
            let instance = handler.instance.as_deref();
            let outcome = match handler.descriptor.invoker() {
                Some(invoker) => invoker(instance, ctx).await,
                None => evaluate_query(instance, ctx).await,
            };
            if let Err(error) = outcome {
                return Err(self.failure(ctx, &handler.descriptor, error));
            }
        }
        Ok(())
    }

    fn failure(
        &self,
        ctx: &MessageContext,
        descriptor: &HandlerDescriptor,
        error: InvokeError,
    ) -> (PipelineError, ErrorDescription) {
        let container = descriptor.container().map_or("<message>", |info| info.name());
        match error {
            InvokeError::Handler(error) => {
                tracing::warn!(
                    message_id = %ctx.message_id(),
                    container,
                    method = descriptor.method_name(),
                    error_type = error.error_type(),
                    error = %error,
                    "handler failed"
                );
                let description = self.options.describer.describe(&error);
                let error = if self.options.preserve_original_error {
                    PipelineError::preserved(error)
                } else {
                    PipelineError::message_processing(ctx.message_id(), ctx.content_type(), error)
                };
                (error, description)
            }
            InvokeError::Binding(error) => {
                let error = PipelineError::Resolution(error);
                let description = self.options.describer.describe_pipeline(&error);
                (error, description)
            }
            InvokeError::Mismatch(expected) => {
                let error = PipelineError::invalid_state(format!(
                    "{container}::{} expected a {expected}",
                    descriptor.method_name()
                ));
                let description = self.options.describer.describe_pipeline(&error);
                (error, description)
            }
        }
    }
}

async fn evaluate_query(
    target: Option<&(dyn Any + Send + Sync)>,
    ctx: &mut MessageContext,
) -> Result<(), InvokeError> {
    let evaluate = ctx
        .extension::<QueryInvocation>()
        .and_then(QueryInvocation::take)
        .ok_or(InvokeError::Mismatch("query expression"))?;
    let target = target.ok_or(InvokeError::Mismatch("query object"))?;
    let value = evaluate(target).await?;
    ctx.set_boxed_result(value);
    Ok(())
}

impl Middleware for ExecutorMiddleware {
    fn name(&self) -> &'static str {
        "handler_executor"
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(self.execute(ctx))
    }
}
