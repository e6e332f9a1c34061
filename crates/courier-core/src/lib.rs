//! # Courier Core
//!
//! Core types shared by every Courier crate.
//!
//! This crate provides the foundational types used throughout Courier:
//!
//! - [`Message`] - One command, query or event with its identity, payload and outcome
//! - [`MessageContext`] - The mutable unit of work flowing through one pipeline traversal
//! - [`ProcessingStatus`] - Forward-only status state machine
//! - [`di::DependencyResolver`] - The "give me an instance of this type" boundary
//! - [`ContentTypeRegistry`] - Canonical content-type names and payload reconstitution
//! - [`PipelineError`] / [`HandlerError`] - The error taxonomy surfaced to callers

#![doc(html_root_url = "https://docs.rs/courier-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod content;
mod context;
pub mod di;
mod error;
mod message;

pub use content::{
    ContentSerializer, ContentTypeInfo, ContentTypeRegistry, GenericPayload, GenericSignature,
    JsonContentSerializer,
};
pub use context::MessageContext;
pub use error::{
    BoxError, DefaultErrorDescriber, ErrorDescriber, ErrorDescription, HandlerError,
    HandlerFailure, HandlerResult, PipelineError, PipelineResult, SerializationError,
};
pub use message::{Message, MessageData, MessageId, MessageKind, Payload, ProcessingStatus};

/// Cooperative cancellation signal threaded to handlers that declare one.
pub use tokio_util::sync::CancellationToken;
