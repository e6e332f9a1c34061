//! Logging and metrics initialisation for Courier.
//!
//! Pipeline stages log through `tracing` and count through the `metrics`
//! facade. Neither does anything until a subscriber and a recorder are
//! installed; this crate installs both from configuration.
//!
//! - **Logging**: `tracing-subscriber` with an env filter, JSON or pretty output
//! - **Metrics**: Prometheus recorder, served on an address or rendered on demand
//!
//! See [`metrics`] for the emitted metric names.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("billing")
//!     .metrics_addr("0.0.0.0:9090")
//!     .build();
//!
//! let _telemetry = init_telemetry(config)?;
//! ```

#![doc(html_root_url = "https://docs.rs/courier-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use crate::metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// What [`init_telemetry`] installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryGuard {
    service_name: String,
    logging: bool,
    metrics: bool,
}

impl TelemetryGuard {
    /// Returns the service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns `true` if a log subscriber was installed.
    #[must_use]
    pub fn logging_enabled(&self) -> bool {
        self.logging
    }

    /// Returns `true` if a metrics recorder was installed.
    #[must_use]
    pub fn metrics_enabled(&self) -> bool {
        self.metrics
    }

    /// Renders the current metrics if the recorder is render-only.
    #[must_use]
    pub fn render_metrics(&self) -> Option<String> {
        if self.metrics {
            render_metrics()
        } else {
            None
        }
    }
}

/// Initializes logging, then metrics.
///
/// Both install process-wide state, so call this once at startup.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        logging: config.logging.enabled,
        metrics: config.metrics.enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let config = TelemetryConfig::builder()
            .service_name("quiet")
            .logging(LogConfig {
                enabled: false,
                ..LogConfig::default()
            })
            .build();

        let guard = init_telemetry(config).unwrap();
        assert_eq!(guard.service_name(), "quiet");
        assert!(!guard.logging_enabled());
        assert!(!guard.metrics_enabled());
        assert!(guard.render_metrics().is_none());
    }
}
