//! # Courier Middleware
//!
//! Middleware pipelines and handler dispatch for Courier.
//!
//! A pipeline is an ordered, editable chain of named stages. The default
//! chain for each message kind is:
//!
//! ```text
//! handler_locator → handler_resolver → handler_executor → telemetry
//! ```
//!
//! | Stage | Middleware | Purpose |
//! |-------|------------|---------|
//! | `validation` | [`stages::ValidationMiddleware`] | Reject invalid messages (optional) |
//! | `handler_locator` | [`stages::LocatorMiddleware`] | Find candidate handlers |
//! | `handler_resolver` | [`stages::ResolverMiddleware`] | Obtain handler objects |
//! | `handler_executor` | [`stages::ExecutorMiddleware`] | Bind arguments and invoke |
//! | `telemetry` | [`stages::TelemetryMiddleware`] | Emit metrics and logs |
//!
//! ## Key Features
//!
//! - **Editable chain**: insert before/after an identifier, remove, append
//! - **Startup registry**: handlers are registered once, lookups are cached
//! - **Generic handlers**: instantiations chosen by the message's type arguments
//! - **Dependency injection**: constructor, property and parameter binding
//! - **Sync and async**: `invoke` drives the same future `invoke_async` awaits on a tokio runtime

#![doc(html_root_url = "https://docs.rs/courier-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod blocking;
mod command;
mod event;
pub mod handlers;
pub mod middleware;
pub mod options;
pub mod pipeline;
mod query;
pub mod stages;

pub use command::CommandPipeline;
pub use event::EventPipeline;
pub use middleware::{BoxFuture, FnMiddleware, Middleware};
pub use options::{ContainerMatch, HandlerSearch, PipelineOptions};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
pub use query::{Query, QueryPipeline, QueryRequest};
