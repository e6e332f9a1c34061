//! Message context.
//!
//! The [`MessageContext`] carries one message through one pipeline traversal:
//! the message itself, the dependency resolver, the caller's cancellation
//! token and a per-invocation key/value bag. It is created by the pipeline
//! entry point and never shared between concurrent invocations.

use crate::di::DependencyResolver;
use crate::error::{ErrorDescription, PipelineError, PipelineResult};
use crate::message::{Message, MessageKind, ProcessingStatus};
use chrono::Utc;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-invocation state that flows through the middleware chain.
pub struct MessageContext {
    message: Message,

    resolver: Arc<dyn DependencyResolver>,

    pipeline: Option<&'static str>,

    cancellation: CancellationToken,

    started_at: Instant,

    failure: Option<PipelineError>,

    result: Option<Box<dyn Any + Send + Sync>>,

    items: HashMap<String, Box<dyn Any + Send + Sync>>,

    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MessageContext {
    /// Creates a context for `message` resolving dependencies through `resolver`.
    ///
    /// The cancellation token defaults to one that is never cancelled.
    #[must_use]
    pub fn new(message: Message, resolver: Arc<dyn DependencyResolver>) -> Self {
        Self {
            message,
            resolver,
            pipeline: None,
            cancellation: CancellationToken::new(),
            started_at: Instant::now(),
            failure: None,
            result: None,
            items: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    /// Threads the caller's cancellation token to handlers.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Records the name of the pipeline processing this context.
    #[must_use]
    pub fn with_pipeline(mut self, name: &'static str) -> Self {
        self.pipeline = Some(name);
        self
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the message mutably.
    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Consumes the context and returns the message.
    #[must_use]
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Returns the message identifier.
    #[must_use]
    pub fn message_id(&self) -> Uuid {
        self.message.id()
    }

    /// Returns the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// Returns the message content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.message.content_type()
    }

    /// Returns the dependency resolver.
    #[must_use]
    pub fn resolver(&self) -> &dyn DependencyResolver {
        self.resolver.as_ref()
    }

    /// Returns a shared handle to the dependency resolver.
    #[must_use]
    pub fn resolver_arc(&self) -> Arc<dyn DependencyResolver> {
        Arc::clone(&self.resolver)
    }

    /// Returns the caller's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the owning pipeline's name, once assigned.
    #[must_use]
    pub fn pipeline(&self) -> Option<&'static str> {
        self.pipeline
    }

    /// Returns the current processing status.
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.message.status()
    }

    /// Returns `true` once the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.message.status().is_terminal()
    }

    /// Moves the status forward.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` for an illegal transition.
    pub fn set_status(&mut self, status: ProcessingStatus) -> PipelineResult<()> {
        self.message.set_status(status)
    }

    /// Marks the message as entering the chain and stamps its creation time.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the message was already processed.
    pub fn begin(&mut self) -> PipelineResult<()> {
        if self.message.status() != ProcessingStatus::NotInitialized {
            return Err(PipelineError::invalid_state(format!(
                "message {} has already entered a pipeline",
                self.message.id()
            )));
        }
        self.message.set_status(ProcessingStatus::Processing)?;
        self.message.set_created_at(Utc::now());
        self.started_at = Instant::now();
        Ok(())
    }

    /// Marks the message as handled successfully.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the status is already terminal.
    pub fn complete(&mut self) -> PipelineResult<()> {
        self.message.set_status(ProcessingStatus::Completed)?;
        self.record_duration();
        Ok(())
    }

    /// Marks the message as failed, keeping `error` to surface to the caller.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the status is already terminal.
    pub fn fail(&mut self, error: PipelineError, description: ErrorDescription) -> PipelineResult<()> {
        self.message.set_status(ProcessingStatus::Failed)?;
        self.message.set_error(description);
        self.failure = Some(error);
        self.record_duration();
        Ok(())
    }

    /// Refuses the message before any handler runs.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the status is already terminal.
    pub fn reject(&mut self, reason: impl Into<String>) -> PipelineResult<()> {
        self.message.set_status(ProcessingStatus::Rejected)?;
        let id = self.message.id();
        self.failure = Some(PipelineError::rejected(id, reason));
        self.record_duration();
        Ok(())
    }

    /// Stores the elapsed time since [`MessageContext::begin`] on the message.
    pub fn record_duration(&mut self) {
        self.message.set_execution_duration(self.started_at.elapsed());
    }

    /// Returns the error recorded by `fail` or `reject`.
    #[must_use]
    pub fn failure(&self) -> Option<&PipelineError> {
        self.failure.as_ref()
    }

    /// Takes the recorded error, leaving the status untouched.
    pub fn take_failure(&mut self) -> Option<PipelineError> {
        self.failure.take()
    }

    /// Stores the value returned to the pipeline caller (queries).
    pub fn set_result<T: Any + Send + Sync>(&mut self, value: T) {
        self.result = Some(Box::new(value));
    }

    /// Stores an already boxed result.
    pub fn set_boxed_result(&mut self, value: Box<dyn Any + Send + Sync>) {
        self.result = Some(value);
    }

    /// Takes the stored result if it is a `T`.
    pub fn take_result<T: Any + Send + Sync>(&mut self) -> Option<T> {
        let boxed = self.result.take()?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.result = Some(other);
                None
            }
        }
    }

    /// Returns `true` if a result was stored.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Sets a value in the per-invocation bag.
    pub fn set_item<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.items.insert(key.into(), Box::new(value));
    }

    /// Gets a value from the per-invocation bag.
    #[must_use]
    pub fn item<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.items.get(key).and_then(|v| v.downcast_ref())
    }

    /// Removes a value from the per-invocation bag.
    pub fn remove_item(&mut self, key: &str) -> bool {
        self.items.remove(key).is_some()
    }

    /// Sets a typed extension used by middleware to hand state to later stages.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Gets a typed extension.
    #[must_use]
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Gets a typed extension mutably.
    pub fn extension_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Removes a typed extension.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Returns time elapsed since the context was created or began.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("message", &self.message)
            .field("pipeline", &self.pipeline)
            .field("failure", &self.failure)
            .field("has_result", &self.result.is_some())
            .field("items", &self.items.len())
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::NullResolver;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Ping;

    fn context() -> MessageContext {
        MessageContext::new(
            Message::new(MessageKind::Command, Ping),
            Arc::new(NullResolver),
        )
    }

    #[test]
    fn test_begin_moves_to_processing() {
        let mut ctx = context();
        ctx.begin().unwrap();
        assert_eq!(ctx.status(), ProcessingStatus::Processing);
        assert!(ctx.begin().is_err());
    }

    #[test]
    fn test_complete_records_duration() {
        let mut ctx = context();
        ctx.begin().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        ctx.complete().unwrap();
        assert!(ctx.message().execution_duration() >= Duration::from_millis(5));
        assert!(ctx.is_terminal());
    }

    #[test]
    fn test_fail_keeps_error() {
        let mut ctx = context();
        ctx.begin().unwrap();
        ctx.fail(
            PipelineError::configuration("boom"),
            ErrorDescription::new("Configuration", "boom"),
        )
        .unwrap();

        assert_eq!(ctx.status(), ProcessingStatus::Failed);
        assert_eq!(ctx.message().error_message(), Some("boom"));
        assert!(ctx.take_failure().is_some());
        assert!(ctx.failure().is_none());
    }

    #[test]
    fn test_reject_is_terminal() {
        let mut ctx = context();
        ctx.begin().unwrap();
        ctx.reject("missing sku").unwrap();
        assert!(matches!(ctx.failure(), Some(PipelineError::Rejected { .. })));
        assert!(ctx.complete().is_err());
    }

    #[test]
    fn test_result_roundtrip() {
        let mut ctx = context();
        ctx.set_result(42_u64);
        assert!(ctx.take_result::<String>().is_none());
        assert!(ctx.has_result());
        assert_eq!(ctx.take_result::<u64>(), Some(42));
        assert!(!ctx.has_result());
    }

    #[test]
    fn test_items_and_extensions() {
        #[derive(Debug, PartialEq)]
        struct Marker(u8);

        let mut ctx = context();
        ctx.set_item("tenant", "acme".to_string());
        assert_eq!(ctx.item::<String>("tenant").map(String::as_str), Some("acme"));
        assert!(ctx.remove_item("tenant"));

        ctx.set_extension(Marker(1));
        ctx.extension_mut::<Marker>().unwrap().0 = 2;
        assert_eq!(ctx.extension::<Marker>(), Some(&Marker(2)));
        assert_eq!(ctx.remove_extension::<Marker>(), Some(Marker(2)));
    }

    #[test]
    fn test_default_cancellation_is_not_cancelled() {
        let ctx = context();
        assert!(!ctx.cancellation().is_cancelled());

        let token = CancellationToken::new();
        let ctx = context().with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.cancellation().is_cancelled());
    }
}
