//! The durable projection of a processed message.

use crate::error::AuditResult;
use crate::wire::{datetime_from_ticks, ticks_from_datetime};
use chrono::{DateTime, Utc};
use courier_core::{
    ContentSerializer, ContentTypeRegistry, ErrorDescription, MessageContext, MessageData,
    MessageKind, Payload, ProcessingStatus, SerializationError,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One processed message as stored by a repository.
///
/// Records are created once per message, appended to one repository and
/// never changed afterwards. Timestamps are kept at tick (100 ns) precision
/// and durations at millisecond precision, matching what every store can
/// represent.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Message identifier.
    pub id: Uuid,
    /// Message kind.
    pub kind: MessageKind,
    /// Canonical content-type name of the payload.
    pub content_type: String,
    /// Payload bytes produced by the content serializer.
    pub content: Vec<u8>,
    /// The reconstituted payload, when the reader knew the content type.
    pub payload: Option<Arc<dyn Payload>>,
    /// Side-channel metadata.
    pub data: MessageData,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// Time spent in the pipeline.
    pub execution_duration: Duration,
    /// Final status.
    pub status: ProcessingStatus,
    /// Failure description, present for failed and rejected messages.
    pub error: Option<ErrorDescription>,
}

impl MessageRecord {
    /// Creates a completed record with empty content, created now.
    #[must_use]
    pub fn new(id: Uuid, kind: MessageKind, content_type: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            content_type: content_type.into(),
            content: Vec::new(),
            payload: None,
            data: MessageData::new(),
            created_at: truncate_to_ticks(Utc::now()),
            execution_duration: Duration::ZERO,
            status: ProcessingStatus::Completed,
            error: None,
        }
    }

    /// Projects a message context into a record.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Serialization` if the payload cannot be encoded.
    pub fn from_context(
        ctx: &MessageContext,
        serializer: &dyn ContentSerializer,
    ) -> AuditResult<Self> {
        let message = ctx.message();
        Ok(Self {
            id: message.id(),
            kind: message.kind(),
            content_type: message.content_type().to_string(),
            content: serializer.encode_payload(message.content())?,
            payload: None,
            data: message.data().cloned().unwrap_or_default(),
            created_at: truncate_to_ticks(message.created_at()),
            execution_duration: truncate_to_millis(message.execution_duration()),
            status: message.status(),
            error: message.error().cloned(),
        })
    }

    /// Sets the serialized content.
    #[must_use]
    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.content = content;
        self
    }

    /// Sets the side-channel data.
    #[must_use]
    pub fn with_data(mut self, data: MessageData) -> Self {
        self.data = data;
        self
    }

    /// Sets the creation time, truncated to tick precision.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = truncate_to_ticks(created_at);
        self
    }

    /// Sets the execution duration, truncated to milliseconds.
    #[must_use]
    pub fn with_execution_duration(mut self, duration: Duration) -> Self {
        self.execution_duration = truncate_to_millis(duration);
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the failure description.
    #[must_use]
    pub fn with_error(mut self, error: ErrorDescription) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns the error type name, if the message failed.
    #[must_use]
    pub fn error_type(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.error_type.as_str())
    }

    /// Returns the error message, if the message failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Returns the execution duration in whole milliseconds, saturating at `i32::MAX`.
    #[must_use]
    pub fn duration_millis(&self) -> i32 {
        i32::try_from(self.execution_duration.as_millis()).unwrap_or(i32::MAX)
    }

    /// Decodes the content bytes into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Serialization` if the bytes are malformed.
    pub fn content_value(&self, serializer: &dyn ContentSerializer) -> AuditResult<Value> {
        if self.content.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serializer.decode(&self.content)?)
    }

    /// Rebuilds the payload through the content-type registry.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Serialization` for unknown content types and
    /// malformed content.
    pub fn decode_payload(
        &self,
        content_types: &ContentTypeRegistry,
        serializer: &dyn ContentSerializer,
    ) -> AuditResult<Box<dyn Payload>> {
        let value = self.content_value(serializer)?;
        Ok(content_types.decode(&self.content_type, value)?)
    }
}

/// Encodes the side-channel data, or `None` when there is none.
pub(crate) fn encode_data(
    data: &MessageData,
    serializer: &dyn ContentSerializer,
) -> AuditResult<Option<Vec<u8>>> {
    if data.is_empty() {
        return Ok(None);
    }
    let value = serde_json::to_value(data).map_err(SerializationError::from)?;
    Ok(Some(serializer.encode(&value)?))
}

pub(crate) fn decode_data(bytes: &[u8], serializer: &dyn ContentSerializer) -> AuditResult<MessageData> {
    let value = serializer.decode(bytes)?;
    Ok(serde_json::from_value(value).map_err(SerializationError::from)?)
}

pub(crate) fn encode_error(
    error: &ErrorDescription,
    serializer: &dyn ContentSerializer,
) -> AuditResult<Vec<u8>> {
    let value = serde_json::to_value(error).map_err(SerializationError::from)?;
    Ok(serializer.encode(&value)?)
}

/// Rebuilds the error description from its stored parts.
///
/// The serialized details win; the plain type and message columns are the
/// fallback for stores that only kept those.
pub(crate) fn decode_error(
    details: Option<&[u8]>,
    error_type: Option<String>,
    message: Option<String>,
    serializer: &dyn ContentSerializer,
) -> AuditResult<Option<ErrorDescription>> {
    if let Some(details) = details {
        let value = serializer.decode(details)?;
        return Ok(Some(serde_json::from_value(value).map_err(SerializationError::from)?));
    }
    if error_type.is_none() && message.is_none() {
        return Ok(None);
    }
    Ok(Some(ErrorDescription::new(
        error_type.unwrap_or_default(),
        message.unwrap_or_default(),
    )))
}

/// Drops precision below one tick (100 ns).
pub(crate) fn truncate_to_ticks(at: DateTime<Utc>) -> DateTime<Utc> {
    ticks_from_datetime(at)
        .and_then(datetime_from_ticks)
        .unwrap_or(at)
}

/// Drops precision below one millisecond.
pub(crate) fn truncate_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
