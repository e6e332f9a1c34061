//! # Courier
//!
//! **In-process command, query and event pipelines**
//!
//! Courier routes messages through an ordered chain of middleware that
//! locates handler methods, resolves the objects that own them, runs them and
//! records the outcome:
//!
//! ```text
//! Message → Validation → HandlerLocator → HandlerResolver → HandlerExecutor
//!                                                                 ↓
//!                               Audit ← Telemetry ←───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Debug, serde::Serialize)]
//! struct CreateOrder { id: u32 }
//!
//! #[derive(Default)]
//! struct OrderHandlers;
//!
//! impl HandlesSync<CreateOrder> for OrderHandlers {
//!     fn handle(&self, _command: &mut CreateOrder, _params: ()) -> HandlerResult {
//!         Ok(())
//!     }
//! }
//!
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("courier.toml")?
//!     .with_env_prefix("COURIER")
//!     .load()?;
//! let _telemetry = courier::init_telemetry(&config)?;
//!
//! let courier = Courier::builder()
//!     .config(config)
//!     .module(HandlerModule::new("orders").container(
//!         ContainerRegistration::<OrderHandlers>::from_default()
//!             .marked()
//!             .method_sync::<CreateOrder, ()>("Handle"),
//!     ))
//!     .build()?;
//!
//! courier.commands().handle(CreateOrder { id: 7 })?;
//! ```
//!
//! ## Crates
//!
//! - [`core`] - messages, contexts, errors, content types, dependency resolution
//! - [`middleware`] - the pipeline, its stages and handler registration
//! - [`audit`] - audit repositories, the binary record format and CSV export
//! - [`config`] - layered configuration
//! - [`telemetry`] - logging and metrics installation

#![doc(html_root_url = "https://docs.rs/courier/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod courier;
mod error;

pub use crate::courier::{handler_search, pipeline_options, Courier, CourierBuilder};
pub use error::{CourierError, CourierResult};

// Re-export core types
pub use courier_core as core;

// Re-export middleware types
pub use courier_middleware as middleware;

// Re-export audit types
pub use courier_audit as audit;

// Re-export configuration types
pub use courier_config as config;

// Re-export telemetry types
pub use courier_telemetry as telemetry;

/// Installs logging and metrics as described by the `telemetry` section.
///
/// Call once at startup, before building pipelines, so that the first
/// messages are already observed.
///
/// # Errors
///
/// Returns `CourierError::Telemetry` if a subscriber or recorder is already
/// installed or the section is invalid.
pub fn init_telemetry(
    config: &courier_config::CourierConfig,
) -> CourierResult<courier_telemetry::TelemetryGuard> {
    let telemetry = courier_telemetry::config::TelemetryConfig::from(&config.telemetry);
    Ok(courier_telemetry::init_telemetry(telemetry)?)
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Courier, CourierBuilder, CourierError, CourierResult};

    pub use courier_core::{
        HandlerResult, Message, MessageContext, MessageData, MessageKind, Payload, PipelineError,
        PipelineResult, ProcessingStatus,
    };

    // Re-export DI types
    pub use courier_core::di::{Container, Inject};

    // Re-export handler registration
    pub use courier_middleware::handlers::{
        ContainerRegistration, Dispose, GenericMethod, HandlerModule, Handles, HandlesSync,
        SelfHandling,
    };

    pub use courier_middleware::stages::ValidationMiddleware;
    pub use courier_middleware::{
        CommandPipeline, EventPipeline, Middleware, PipelineOptions, QueryPipeline,
    };

    // Re-export audit types
    pub use courier_audit::{MessageQuery, MessageRecord, MessageRepository};

    pub use courier_config::{ConfigLoader, CourierConfig};
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::{LoggingConfig, TelemetryConfigSection};

    #[test]
    fn test_init_telemetry_with_everything_disabled() {
        let config = courier_config::CourierConfig::builder()
            .telemetry(TelemetryConfigSection {
                service_name: "billing".to_string(),
                logging: LoggingConfig {
                    enabled: false,
                    ..LoggingConfig::default()
                },
                ..TelemetryConfigSection::default()
            })
            .build();

        let guard = init_telemetry(&config).unwrap();
        assert_eq!(guard.service_name(), "billing");
        assert!(!guard.logging_enabled());
        assert!(!guard.metrics_enabled());
    }
}
