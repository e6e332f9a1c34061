//! Message model.
//!
//! A [`Message`] is one request or fact flowing through a pipeline: a command,
//! a query or an event. The caller supplies only the payload; identity, timing,
//! status and error details are captured by the pipeline.

use crate::error::{ErrorDescription, PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use uuid::Uuid;

/// String-keyed, string-valued side channel carried alongside a payload.
pub type MessageData = BTreeMap<String, String>;

/// The kind of a message, which determines the pipeline that may accept it.
///
/// The discriminants are the wire encoding used by the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    /// Kind not known (e.g. a record written by a newer producer).
    #[default]
    Unknown = 0,
    /// A request to change state; exactly one handler processes it.
    Command = 1,
    /// A request for data; answered by a query object.
    Query = 2,
    /// A fact; zero or more handlers react to it.
    Event = 3,
}

impl MessageKind {
    /// Returns the single-byte wire value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a wire byte, mapping unknown values to [`MessageKind::Unknown`].
    #[must_use]
    pub const fn from_byte(value: u8) -> Self {
        match value {
            1 => Self::Command,
            2 => Self::Query,
            3 => Self::Event,
            _ => Self::Unknown,
        }
    }

    /// Returns the lower-case name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Command => "command",
            Self::Query => "query",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Processing status of a message.
///
/// ```text
/// NotInitialized → Processing → { Completed | Failed | Rejected }
/// ```
///
/// Transitions are strictly forward; a terminal status never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProcessingStatus {
    /// The message has not entered a pipeline yet.
    #[default]
    NotInitialized = 0,
    /// The message is travelling through the middleware chain.
    Processing = 1,
    /// Handlers ran successfully.
    Completed = 2,
    /// A handler or the infrastructure raised an error.
    Failed = 3,
    /// The message was refused before reaching a handler.
    Rejected = 4,
}

impl ProcessingStatus {
    /// Returns `true` for `Completed`, `Failed` and `Rejected`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }

    /// Returns `true` if moving from `self` to `next` respects the state machine.
    ///
    /// A message is processed before it completes or fails; only a rejection
    /// may skip processing. Re-asserting the current status is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::NotInitialized, Self::NotInitialized | Self::Processing | Self::Rejected) => true,
            (Self::Processing, next) => !matches!(next, Self::NotInitialized),
            (current, next) => current as u8 == next as u8,
        }
    }

    /// Returns the single-byte wire value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a wire byte.
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotInitialized),
            1 => Some(Self::Processing),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            4 => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns the lower-case name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lazily generated message identifier.
///
/// The UUID (v7, time-ordered) is generated on first read. Once read, the
/// identifier can no longer be reassigned.
#[derive(Debug, Default)]
pub struct MessageId(OnceLock<Uuid>);

impl MessageId {
    /// Creates an identifier that will be generated on first access.
    #[must_use]
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Creates an identifier with a fixed value.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(uuid);
        Self(cell)
    }

    /// Returns the identifier, generating it if necessary.
    #[must_use]
    pub fn get(&self) -> Uuid {
        *self.0.get_or_init(Uuid::now_v7)
    }

    /// Returns `true` once a value exists (assigned or generated).
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    /// Assigns an explicit identifier.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the identifier was already
    /// assigned or read.
    pub fn assign(&self, uuid: Uuid) -> PipelineResult<()> {
        self.0
            .set(uuid)
            .map_err(|_| PipelineError::invalid_state("message id is immutable once read"))
    }
}

impl Clone for MessageId {
    fn clone(&self) -> Self {
        Self::from_uuid(self.get())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A message payload.
///
/// Implemented automatically for every `Serialize + Debug + Send + Sync + 'static`
/// type, so application types never implement it by hand.
pub trait Payload: Any + Send + Sync + fmt::Debug + 'static {
    /// Returns the payload as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the payload as `&mut dyn Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Converts the boxed payload into `Box<dyn Any>` for owned downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Returns the Rust type name of the payload.
    fn type_name(&self) -> &'static str;

    /// Serializes the payload into a JSON value.
    fn to_value(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> Payload for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl dyn Payload {
    /// Downcasts to a concrete payload type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Downcasts to a concrete payload type, mutably.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    /// Returns `true` if the payload is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Takes ownership of the payload as a `T`, or `None` for another type.
    #[must_use]
    pub fn downcast<T: Any>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

/// One command, query or event.
#[derive(Debug)]
pub struct Message {
    id: MessageId,
    kind: MessageKind,
    content_type: String,
    content: Box<dyn Payload>,
    data: Option<MessageData>,
    created_at: DateTime<Utc>,
    execution_duration: Duration,
    status: ProcessingStatus,
    error: Option<ErrorDescription>,
}

impl Message {
    /// Creates a message whose content type is the payload's Rust type name.
    #[must_use]
    pub fn new<T: Payload>(kind: MessageKind, content: T) -> Self {
        Self::from_boxed(kind, std::any::type_name::<T>(), Box::new(content))
    }

    /// Creates a message from an already boxed payload and explicit content type.
    #[must_use]
    pub fn from_boxed(
        kind: MessageKind,
        content_type: impl Into<String>,
        content: Box<dyn Payload>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            content_type: content_type.into(),
            content,
            data: None,
            created_at: Utc::now(),
            execution_duration: Duration::ZERO,
            status: ProcessingStatus::NotInitialized,
            error: None,
        }
    }

    /// Overrides the content type name.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Attaches side-channel data.
    #[must_use]
    pub fn with_data(mut self, data: MessageData) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns the message identifier, generating it on first access.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id.get()
    }

    /// Assigns an explicit identifier before it was ever read.
    ///
    /// # Errors
    ///
    /// Fails once the identifier has been observed.
    pub fn assign_id(&self, id: Uuid) -> PipelineResult<()> {
        self.id.assign(id)
    }

    /// Returns the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the canonical content type name.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the payload.
    #[must_use]
    pub fn content(&self) -> &dyn Payload {
        self.content.as_ref()
    }

    /// Returns the payload mutably; handlers write results back through this.
    pub fn content_mut(&mut self) -> &mut dyn Payload {
        self.content.as_mut()
    }

    /// Consumes the message and returns the payload.
    #[must_use]
    pub fn into_content(self) -> Box<dyn Payload> {
        self.content
    }

    /// Returns the side-channel data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&MessageData> {
        self.data.as_ref()
    }

    /// Returns the side-channel data, creating it when absent.
    pub fn data_mut(&mut self) -> &mut MessageData {
        self.data.get_or_insert_with(MessageData::new)
    }

    /// Returns when the pipeline accepted the message.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.created_at = created_at;
    }

    /// Returns the measured execution time.
    #[must_use]
    pub fn execution_duration(&self) -> Duration {
        self.execution_duration
    }

    pub(crate) fn set_execution_duration(&mut self, duration: Duration) {
        self.execution_duration = duration;
    }

    /// Returns the processing status.
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// Moves the status forward.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` for a backwards transition or an
    /// attempt to change a terminal status.
    pub fn set_status(&mut self, next: ProcessingStatus) -> PipelineResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::invalid_state(format!(
                "cannot move message {} from {} to {}",
                self.id(),
                self.status,
                next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Returns the error details, present only when the status is `Failed`.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorDescription> {
        self.error.as_ref()
    }

    /// Returns the error message, if the message failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Returns the error type, if the message failed.
    #[must_use]
    pub fn error_type(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.error_type.as_str())
    }

    pub(crate) fn set_error(&mut self, error: ErrorDescription) {
        self.error = Some(error);
    }
}
