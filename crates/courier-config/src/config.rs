//! Main configuration types.
//!
//! This module provides the top-level [`CourierConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{
    AuditConfig, AuditStoreConfig, ConfigError, HandlerSearchMode, LogFormat, PipelineConfig,
    TelemetryConfigSection,
};

/// Complete Courier configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use courier_config::CourierConfig;
///
/// let config = CourierConfig::default();
/// assert!(!config.pipeline.preserve_original_error);
/// assert!(!config.audit.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Pipeline dispatch configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Audit trail configuration.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Telemetry configuration (logging, metrics).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl CourierConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use courier_config::{AuditConfig, CourierConfig};
    ///
    /// let config = CourierConfig::builder()
    ///     .audit(AuditConfig {
    ///         enabled: true,
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert!(config.audit.enabled);
    /// ```
    #[must_use]
    pub fn builder() -> CourierConfigBuilder {
        CourierConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` or `ConfigError::MissingField` if:
    /// - A handler naming convention is empty
    /// - The audit file path or table name is missing or malformed
    /// - `audit.default_take` is zero
    /// - The metrics address or histogram buckets are invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.pipeline.handler_search;
        if search.mode == HandlerSearchMode::Suffix && search.container_suffix.is_empty() {
            return Err(ConfigError::invalid_value(
                "pipeline.handler_search.container_suffix",
                "must not be empty in 'suffix' mode",
            ));
        }
        match &search.method_name {
            Some(name) if name.is_empty() => {
                return Err(ConfigError::invalid_value(
                    "pipeline.handler_search.method_name",
                    "must not be empty when set",
                ));
            }
            None if search.method_prefix.is_empty() => {
                return Err(ConfigError::invalid_value(
                    "pipeline.handler_search.method_prefix",
                    "must not be empty unless method_name is set",
                ));
            }
            _ => {}
        }

        if self.audit.default_take == Some(0) {
            return Err(ConfigError::invalid_value(
                "audit.default_take",
                "must be greater than zero",
            ));
        }
        match &self.audit.store {
            AuditStoreConfig::Memory => {}
            AuditStoreConfig::File { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::missing_field("audit.store.path"));
                }
            }
            AuditStoreConfig::Sql { table, .. } => {
                if !is_table_name(table) {
                    return Err(ConfigError::invalid_value(
                        "audit.store.table",
                        format!("not a plain table name: '{table}'"),
                    ));
                }
            }
        }

        if self.telemetry.service_name.is_empty() {
            return Err(ConfigError::missing_field("telemetry.service_name"));
        }
        if self.telemetry.logging.enabled && self.telemetry.logging.level.is_empty() {
            return Err(ConfigError::missing_field("telemetry.logging.level"));
        }

        let metrics = &self.telemetry.metrics;
        if let Some(addr) = &metrics.addr {
            if metrics.enabled && addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }
        if metrics.histogram_buckets.is_empty()
            || metrics.histogram_buckets.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.histogram_buckets",
                "must be non-empty and strictly increasing",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty log formatting with ANSI colors and source locations
    /// - Debug log level
    /// - In-memory audit trail
    ///
    /// # Example
    ///
    /// ```
    /// use courier_config::CourierConfig;
    ///
    /// let config = CourierConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// assert!(config.audit.enabled);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.logging.include_location = true;

        config.audit.enabled = true;
        config.audit.store = AuditStoreConfig::Memory;

        config
    }

    /// Create a production configuration preset.
    ///
    /// - JSON log formatting at info level
    /// - Prometheus recorder installed
    /// - Gzip file audit trail with paged reads
    ///
    /// # Example
    ///
    /// ```
    /// use courier_config::{CourierConfig, LogFormat};
    ///
    /// let config = CourierConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// assert_eq!(config.audit.store.kind(), "file");
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;
        config.telemetry.metrics.enabled = true;

        config.audit.enabled = true;
        config.audit.store = AuditStoreConfig::File {
            path: "courier-audit.log.gz".into(),
            gzip: true,
        };
        config.audit.default_take = Some(1000);

        config
    }
}

fn is_table_name(table: &str) -> bool {
    !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Builder for [`CourierConfig`].
#[derive(Debug, Default)]
pub struct CourierConfigBuilder {
    pipeline: Option<PipelineConfig>,
    audit: Option<AuditConfig>,
    telemetry: Option<TelemetryConfigSection>,
}

impl CourierConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pipeline configuration.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set the audit configuration.
    #[must_use]
    pub fn audit(mut self, audit: AuditConfig) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> CourierConfig {
        CourierConfig {
            pipeline: self.pipeline.unwrap_or_default(),
            audit: self.audit.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<CourierConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
