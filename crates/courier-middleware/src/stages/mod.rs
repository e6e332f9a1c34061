//! Built-in middleware stages.
//!
//! The dispatch stages must run in this order:
//!
//! 1. [`LocatorMiddleware`] (`handler_locator`) finds the candidate handlers
//! 2. [`ResolverMiddleware`] (`handler_resolver`) obtains the handler objects
//! 3. [`ExecutorMiddleware`] (`handler_executor`) binds arguments and invokes
//!
//! [`ValidationMiddleware`] (`validation`) usually precedes them and
//! [`TelemetryMiddleware`] (`telemetry`) follows them. Stages hand state to
//! each other through context extensions.

pub mod executor;
pub mod locator;
pub mod resolver;
pub mod telemetry;
pub mod validation;

pub use executor::ExecutorMiddleware;
pub use locator::{LocatedHandlers, LocatorMiddleware};
pub use resolver::ResolverMiddleware;
pub use telemetry::{MessageTelemetry, TelemetryMiddleware};
pub use validation::ValidationMiddleware;

use crate::options::PipelineOptions;
use courier_core::{MessageContext, PipelineError, PipelineResult};

/// Marks the message failed with an infrastructure error described by the pipeline describer.
pub(crate) fn record_failure(
    ctx: &mut MessageContext,
    options: &PipelineOptions,
    error: PipelineError,
) -> PipelineResult<()> {
    tracing::debug!(
        message_id = %ctx.message_id(),
        content_type = ctx.content_type(),
        error = %error,
        "message failed"
    );
    let description = options.describer.describe_pipeline(&error);
    ctx.fail(error, description)
}
