//! The audit pipeline stage.
//!
//! # Metrics Emitted
//!
//! - `courier_audit_records_total{repository}` - records appended
//! - `courier_audit_failures_total{repository}` - appends that failed

use crate::record::MessageRecord;
use crate::repository::MessageRepository;
use courier_core::{
    ContentSerializer, JsonContentSerializer, MessageContext, PipelineError, PipelineResult,
};
use courier_middleware::{BoxFuture, Middleware};
use std::fmt;
use std::sync::Arc;

/// Appends one [`MessageRecord`] per processed message to a repository.
///
/// Messages still in flight are ignored, so the stage belongs after the
/// handler executor. Repository failures abort the chain as
/// `PipelineError::Persistence`.
pub struct AuditMiddleware {
    repository: Arc<dyn MessageRepository>,
    serializer: Arc<dyn ContentSerializer>,
}

impl AuditMiddleware {
    /// Creates the stage over `repository`, encoding content as JSON.
    #[must_use]
    pub fn new(repository: Arc<dyn MessageRepository>) -> Self {
        Self {
            repository,
            serializer: Arc::new(JsonContentSerializer),
        }
    }

    /// Replaces the content serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ContentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Returns the repository records are written to.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn MessageRepository> {
        &self.repository
    }

    fn record(&self, ctx: &MessageContext) -> PipelineResult<()> {
        if !ctx.is_terminal() {
            return Ok(());
        }

        let repository = self.repository.name();
        let result = MessageRecord::from_context(ctx, self.serializer.as_ref())
            .and_then(|record| self.repository.add(&record));
        if let Err(e) = result {
            metrics::counter!("courier_audit_failures_total", "repository" => repository)
                .increment(1);
            tracing::error!(
                message_id = %ctx.message_id(),
                content_type = ctx.content_type(),
                repository,
                error = %e,
                "failed to append audit record"
            );
            return Err(PipelineError::persistence(e));
        }

        metrics::counter!("courier_audit_records_total", "repository" => repository).increment(1);
        tracing::debug!(
            message_id = %ctx.message_id(),
            status = ctx.status().name(),
            repository,
            "audit record appended"
        );
        Ok(())
    }
}

impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        let result = self.record(ctx);
        Box::pin(std::future::ready(result))
    }
}

impl fmt::Debug for AuditMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditMiddleware")
            .field("repository", &self.repository.name())
            .field("serializer", &self.serializer.name())
            .finish()
    }
}
