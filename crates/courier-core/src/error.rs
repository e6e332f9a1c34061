//! Error types for Courier.
//!
//! Three families of errors meet here:
//!
//! | Type | Raised by | Surfaces as |
//! |---|---|---|
//! | [`HandlerError`] | handler bodies (`?` on any error) | wrapped in `PipelineError::MessageProcessing`, or `PipelineError::Handler` when originals are preserved |
//! | [`PipelineError`] | pipelines and middleware | returned to the caller of `invoke` |
//! | [`SerializationError`] | content serializers | `PipelineError::Serialization` |
//!
//! A missing handler (`HandlerNotFound`) is never wrapped; it is distinct from
//! a handler that ran and failed.

use crate::di::ResolutionError;
use crate::message::MessageKind;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A boxed, thread-safe error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Return type of handler methods.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors surfaced to the caller of a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No handler could be located for the message.
    #[error("no handler found for {kind} '{content_type}'")]
    HandlerNotFound {
        /// The content type that had no handler.
        content_type: String,
        /// The kind of the message.
        kind: MessageKind,
    },

    /// The message was refused before it reached a handler.
    #[error("message {message_id} rejected: {reason}")]
    Rejected {
        /// The rejected message.
        message_id: Uuid,
        /// Why it was rejected.
        reason: String,
    },

    /// A handler failed; the original error is the source.
    #[error("error processing message {message_id} of type '{content_type}': {source}")]
    MessageProcessing {
        /// The failed message.
        message_id: Uuid,
        /// Its content type.
        content_type: String,
        /// Type name of the original error.
        error_type: String,
        /// The original handler error.
        #[source]
        source: BoxError,
    },

    /// A handler failed and the pipeline preserves original errors.
    #[error("{original}")]
    Handler {
        /// Type name of the original error.
        error_type: String,
        /// The original handler error, unmodified.
        original: BoxError,
    },

    /// The handler object could not be built.
    #[error("handler resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// The pipeline was misconfigured.
    #[error("pipeline configuration error: {0}")]
    Configuration(String),

    /// An audit repository failed to persist the message.
    #[error("failed to persist message: {source}")]
    Persistence {
        /// The repository error.
        #[source]
        source: BoxError,
    },

    /// An illegal state change was attempted.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Payload serialization failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl PipelineError {
    /// Creates a handler-not-found error.
    #[must_use]
    pub fn handler_not_found(content_type: impl Into<String>, kind: MessageKind) -> Self {
        Self::HandlerNotFound {
            content_type: content_type.into(),
            kind,
        }
    }

    /// Creates a rejection.
    #[must_use]
    pub fn rejected(message_id: Uuid, reason: impl Into<String>) -> Self {
        Self::Rejected {
            message_id,
            reason: reason.into(),
        }
    }

    /// Wraps a handler error into the generic processing error.
    #[must_use]
    pub fn message_processing(
        message_id: Uuid,
        content_type: impl Into<String>,
        error: HandlerError,
    ) -> Self {
        Self::MessageProcessing {
            message_id,
            content_type: content_type.into(),
            error_type: error.error_type().to_string(),
            source: error.into_inner(),
        }
    }

    /// Re-raises a handler error unmodified.
    #[must_use]
    pub fn preserved(error: HandlerError) -> Self {
        Self::Handler {
            error_type: error.error_type().to_string(),
            original: error.into_inner(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a persistence error.
    pub fn persistence(source: impl Into<BoxError>) -> Self {
        Self::Persistence {
            source: source.into(),
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns a short, stable name for the variant.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::HandlerNotFound { .. } => "HandlerNotFound",
            Self::Rejected { .. } => "Rejected",
            Self::MessageProcessing { .. } => "MessageProcessing",
            Self::Handler { .. } => "Handler",
            Self::Resolution(_) => "Resolution",
            Self::Configuration(_) => "Configuration",
            Self::Persistence { .. } => "Persistence",
            Self::InvalidState(_) => "InvalidState",
            Self::Serialization(_) => "Serialization",
        }
    }

    /// Returns the original handler error as `E`, if this error carries one.
    ///
    /// Works for both the wrapped and the preserved form.
    #[must_use]
    pub fn original<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::MessageProcessing { source, .. } => source.downcast_ref::<E>(),
            Self::Handler { original, .. } => original.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns `true` for `HandlerNotFound`.
    #[must_use]
    pub const fn is_handler_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }
}

/// Error raised by a handler body.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into it with `?`,
/// keeping the concrete type for downcasting and the type name for auditing.
pub struct HandlerError {
    error_type: &'static str,
    inner: BoxError,
}

impl HandlerError {
    /// Creates an error from a plain message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::from(HandlerFailure(message.into()))
    }

    /// Returns the type name of the original error.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        self.error_type
    }

    /// Returns `true` if the original error is an `E`.
    #[must_use]
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Downcasts the original error.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Returns the original error as a trait object.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Returns the original boxed error.
    #[must_use]
    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            error_type: std::any::type_name::<E>(),
            inner: Box::new(error),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("error_type", &self.error_type)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Error produced by [`HandlerError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerFailure(String);

/// Errors from content serializers and the content-type registry.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// JSON encoding or decoding failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The content type is not registered.
    #[error("unknown content type '{0}'")]
    UnknownContentType(String),

    /// The serializer rejected the input.
    #[error("serializer '{serializer}' failed: {reason}")]
    Serializer {
        /// The serializer name.
        serializer: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// Serializable description of a failure, persisted with audit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    /// Type name of the error.
    pub error_type: String,
    /// Display text of the error.
    pub message: String,
    /// Display text of each source in the chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl ErrorDescription {
    /// Creates a description without a source chain.
    #[must_use]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            chain: Vec::new(),
        }
    }
}

/// Turns errors into [`ErrorDescription`]s for the message and its audit record.
///
/// Supplied through pipeline options; there is no process-wide describer.
pub trait ErrorDescriber: Send + Sync + fmt::Debug {
    /// Describes a handler error.
    fn describe(&self, error: &HandlerError) -> ErrorDescription;

    /// Describes an infrastructure error raised by the pipeline itself.
    fn describe_pipeline(&self, error: &PipelineError) -> ErrorDescription;
}

/// Describer that records the type name, the display text and the source chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorDescriber;

impl DefaultErrorDescriber {
    fn chain(mut source: Option<&(dyn StdError + 'static)>) -> Vec<String> {
        let mut chain = Vec::new();
        while let Some(error) = source {
            chain.push(error.to_string());
            source = error.source();
        }
        chain
    }
}

impl ErrorDescriber for DefaultErrorDescriber {
    fn describe(&self, error: &HandlerError) -> ErrorDescription {
        let inner: &(dyn StdError + 'static) = error.as_error();
        ErrorDescription {
            error_type: error.error_type().to_string(),
            message: inner.to_string(),
            chain: Self::chain(inner.source()),
        }
    }

    fn describe_pipeline(&self, error: &PipelineError) -> ErrorDescription {
        ErrorDescription {
            error_type: error.kind_name().to_string(),
            message: error.to_string(),
            chain: Self::chain(error.source()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("insufficient funds: {0}")]
    struct InsufficientFunds(u32);

    fn failing() -> HandlerResult {
        Err(InsufficientFunds(10).into())
    }

    #[test]
    fn test_handler_error_keeps_type() {
        let err = failing().unwrap_err();
        assert!(err.error_type().ends_with("InsufficientFunds"));
        assert!(err.is::<InsufficientFunds>());
        assert_eq!(err.to_string(), "insufficient funds: 10");
    }

    #[test]
    fn test_wrapped_error_exposes_original() {
        let err = failing().unwrap_err();
        let wrapped = PipelineError::message_processing(Uuid::nil(), "Withdraw", err);
        assert!(matches!(wrapped, PipelineError::MessageProcessing { .. }));
        assert_eq!(
            wrapped.original::<InsufficientFunds>(),
            Some(&InsufficientFunds(10))
        );
        assert!(wrapped.source().is_some());
    }

    #[test]
    fn test_preserved_error_displays_original() {
        let err = failing().unwrap_err();
        let preserved = PipelineError::preserved(err);
        assert_eq!(preserved.to_string(), "insufficient funds: 10");
        assert!(preserved.original::<InsufficientFunds>().is_some());
    }

    #[test]
    fn test_handler_not_found_is_distinct() {
        let err = PipelineError::handler_not_found("Ping", MessageKind::Command);
        assert!(err.is_handler_not_found());
        assert!(err.original::<InsufficientFunds>().is_none());
        assert!(err.to_string().contains("Ping"));
    }

    #[test]
    fn test_default_describer() {
        let err = failing().unwrap_err();
        let description = DefaultErrorDescriber.describe(&err);
        assert!(description.error_type.ends_with("InsufficientFunds"));
        assert_eq!(description.message, "insufficient funds: 10");
        assert!(description.chain.is_empty());
    }

    #[test]
    fn test_describe_pipeline_error() {
        let err = PipelineError::handler_not_found("Ping", MessageKind::Query);
        let description = DefaultErrorDescriber.describe_pipeline(&err);
        assert_eq!(description.error_type, "HandlerNotFound");
    }

    #[test]
    fn test_handler_error_msg() {
        let err = HandlerError::msg("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(err.is::<HandlerFailure>());
    }
}
