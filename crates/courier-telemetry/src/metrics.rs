//! Prometheus metrics for Courier.
//!
//! Pipeline stages emit through the `metrics` facade; this module installs
//! the Prometheus recorder that collects them.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `courier_messages_total` | Counter | `kind`, `status` | Processed messages |
//! | `courier_message_duration_seconds` | Histogram | `kind` | Time in the pipeline |
//! | `courier_audit_records_total` | Counter | `repository` | Audit records appended |
//! | `courier_audit_failures_total` | Counter | `repository` | Failed audit appends |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use courier_config::MetricsConfig as MetricsSection;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Metric names emitted by the pipeline stages.
pub mod names {
    /// Processed messages by kind and terminal status.
    pub const MESSAGES_TOTAL: &str = "courier_messages_total";
    /// Time from dispatch to terminal status.
    pub const MESSAGE_DURATION_SECONDS: &str = "courier_message_duration_seconds";
    /// Audit records appended.
    pub const AUDIT_RECORDS_TOTAL: &str = "courier_audit_records_total";
    /// Audit appends that failed.
    pub const AUDIT_FAILURES_TOTAL: &str = "courier_audit_failures_total";
}

/// Global handle for rendering, set when the recorder is render-only.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are collected.
    pub enabled: bool,

    /// Scrape endpoint address; without one, metrics are only rendered on demand.
    pub addr: Option<String>,

    /// Histogram buckets for message duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::from_section(&MetricsSection::default())
    }
}

impl MetricsConfig {
    /// Builds the configuration from the `telemetry.metrics` section.
    #[must_use]
    pub fn from_section(section: &MetricsSection) -> Self {
        Self {
            enabled: section.enabled,
            addr: section.addr.clone(),
            duration_buckets: section.histogram_buckets.clone(),
        }
    }
}

/// Installs the Prometheus recorder.
///
/// With an address the exporter serves `/metrics` itself, on the current
/// tokio runtime or a background thread. Without one the recorder is
/// render-only and [`render_metrics`] returns the exposition text.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address,
/// `TelemetryError::InvalidConfig` for empty buckets, and
/// `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }
    if config.duration_buckets.is_empty() {
        return Err(TelemetryError::InvalidConfig(
            "duration buckets must not be empty".to_string(),
        ));
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::MESSAGE_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;

    match &config.addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }
        None => {
            let handle = builder
                .install_recorder()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let _ = METRICS_HANDLE.set(handle);
        }
    }

    register_metric_descriptions();

    Ok(())
}

/// Returns the render handle if a render-only recorder is installed.
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` unless a render-only recorder is installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::MESSAGES_TOTAL, "Messages that reached a terminal status");
    describe_histogram!(
        names::MESSAGE_DURATION_SECONDS,
        Unit::Seconds,
        "Time from dispatch to terminal status"
    );
    describe_counter!(names::AUDIT_RECORDS_TOTAL, "Audit records appended");
    describe_counter!(names::AUDIT_FAILURES_TOTAL, "Audit appends that failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert!(config.addr.is_none());
        assert_eq!(config.duration_buckets.len(), 12);
    }

    #[test]
    fn test_disabled_metrics_install_nothing() {
        let config = MetricsConfig {
            addr: Some("not an address".to_string()),
            ..MetricsConfig::default()
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let empty = MetricsConfig {
            enabled: true,
            duration_buckets: Vec::new(),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            init_metrics(&empty),
            Err(TelemetryError::InvalidConfig(_))
        ));

        let bad_addr = MetricsConfig {
            enabled: true,
            addr: Some("localhost".to_string()),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            init_metrics(&bad_addr),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_from_section() {
        let section = MetricsSection {
            enabled: true,
            addr: Some("127.0.0.1:9102".to_string()),
            histogram_buckets: vec![0.01, 0.1, 1.0],
        };
        let config = MetricsConfig::from_section(&section);
        assert!(config.enabled);
        assert_eq!(config.addr.as_deref(), Some("127.0.0.1:9102"));
        assert_eq!(config.duration_buckets, vec![0.01, 0.1, 1.0]);
    }
}
