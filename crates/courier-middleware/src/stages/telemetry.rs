//! Telemetry emission middleware.
//!
//! Emits metrics and one structured log line for every message that reached a
//! terminal status. Place it after the handler executor.
//!
//! # Metrics Emitted
//!
//! - `courier_messages_total{kind,status}` - counter of processed messages
//! - `courier_message_duration_seconds{kind}` - histogram of execution time
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! they are discarded.

use crate::middleware::{BoxFuture, Middleware};
use courier_core::{MessageContext, PipelineResult, ProcessingStatus};
use std::time::Duration;

/// Telemetry recorded for the message, readable by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTelemetry {
    /// Pipeline that processed the message.
    pub pipeline: Option<&'static str>,
    /// Message kind label.
    pub kind: &'static str,
    /// Terminal status label.
    pub status: &'static str,
    /// Time spent in the pipeline.
    pub duration: Duration,
}

/// Emits metrics and logs for every processed message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryMiddleware;

impl TelemetryMiddleware {
    /// Creates the telemetry stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn emit(ctx: &mut MessageContext) {
        if !ctx.is_terminal() {
            return;
        }

        let data = MessageTelemetry {
            pipeline: ctx.pipeline(),
            kind: ctx.kind().name(),
            status: ctx.status().name(),
            duration: ctx.message().execution_duration(),
        };

        metrics::counter!(
            "courier_messages_total",
            "kind" => data.kind,
            "status" => data.status
        )
        .increment(1);
        metrics::histogram!("courier_message_duration_seconds", "kind" => data.kind)
            .record(data.duration.as_secs_f64());

        let duration_ms = data.duration.as_secs_f64() * 1000.0;
        if ctx.status() == ProcessingStatus::Completed {
            tracing::info!(
                message_id = %ctx.message_id(),
                content_type = ctx.content_type(),
                kind = data.kind,
                status = data.status,
                duration_ms,
                "message processed"
            );
        } else {
            tracing::warn!(
                message_id = %ctx.message_id(),
                content_type = ctx.content_type(),
                kind = data.kind,
                status = data.status,
                duration_ms,
                error_type = ctx.message().error_type().unwrap_or_default(),
                error = ctx.message().error_message().unwrap_or_default(),
                "message not processed"
            );
        }

        ctx.set_extension(data);
    }
}

impl Middleware for TelemetryMiddleware {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        Self::emit(ctx);
        Box::pin(std::future::ready(Ok(())))
    }
}
