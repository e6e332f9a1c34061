//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How handler containers are recognised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandlerSearchMode {
    /// Only containers explicitly marked as handler containers.
    #[default]
    Marked,
    /// Marked containers plus any container whose name ends with the suffix.
    Suffix,
}

impl HandlerSearchMode {
    /// Parses the lowercase configuration name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "marked" => Some(Self::Marked),
            "suffix" => Some(Self::Suffix),
            _ => None,
        }
    }
}

/// Handler naming conventions.
///
/// # Example
///
/// ```
/// use courier_config::{HandlerSearchConfig, HandlerSearchMode};
///
/// let search = HandlerSearchConfig {
///     mode: HandlerSearchMode::Suffix,
///     ..Default::default()
/// };
/// assert_eq!(search.container_suffix, "Handlers");
/// assert_eq!(search.method_prefix, "Handle");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HandlerSearchConfig {
    /// How containers are recognised.
    #[serde(default)]
    pub mode: HandlerSearchMode,

    /// Container name suffix used in `suffix` mode.
    #[serde(default = "default_container_suffix")]
    pub container_suffix: String,

    /// Handler method name prefix.
    #[serde(default = "default_method_prefix")]
    pub method_prefix: String,

    /// Exact handler method name; overrides the prefix when set.
    #[serde(default)]
    pub method_name: Option<String>,
}

impl Default for HandlerSearchConfig {
    fn default() -> Self {
        Self {
            mode: HandlerSearchMode::default(),
            container_suffix: default_container_suffix(),
            method_prefix: default_method_prefix(),
            method_name: None,
        }
    }
}

fn default_container_suffix() -> String {
    "Handlers".to_string()
}

fn default_method_prefix() -> String {
    "Handle".to_string()
}

/// Pipeline dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Re-raise handler errors unmodified instead of wrapping them.
    #[serde(default)]
    pub preserve_original_error: bool,

    /// Fill unset injectable properties of freshly constructed handlers.
    #[serde(default)]
    pub use_properties_resolving: bool,

    /// Handler naming conventions.
    #[serde(default)]
    pub handler_search: HandlerSearchConfig,
}

/// SQL dialect of the audit table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialectName {
    /// `[Column]` quoting with `OFFSET ... FETCH` paging.
    #[default]
    Bracket,
    /// `` `Column` `` quoting with `LIMIT ... OFFSET` paging.
    Backtick,
    /// Unquoted identifiers with `LIMIT ... OFFSET` paging.
    Plain,
}

impl SqlDialectName {
    /// Parses the lowercase configuration name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "bracket" => Some(Self::Bracket),
            "backtick" => Some(Self::Backtick),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }
}

/// Where audit records are stored.
///
/// In TOML the variant is chosen with `kind`:
///
/// ```toml
/// [audit.store]
/// kind = "file"
/// path = "/var/log/courier/audit.log.gz"
/// gzip = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuditStoreConfig {
    /// Records kept in process memory.
    #[default]
    Memory,
    /// Records appended to one file.
    File {
        /// File path.
        path: PathBuf,
        /// Write one gzip member per record.
        #[serde(default)]
        gzip: bool,
    },
    /// Records inserted into a relational table.
    Sql {
        /// Statement dialect.
        #[serde(default)]
        dialect: SqlDialectName,
        /// Table name.
        #[serde(default = "default_table")]
        table: String,
    },
}

impl AuditStoreConfig {
    /// Returns the `kind` name of the store.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File { .. } => "file",
            Self::Sql { .. } => "sql",
        }
    }

    /// Returns the store of `kind` with default settings.
    #[must_use]
    pub fn of_kind(kind: &str) -> Option<Self> {
        match kind.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "file" => Some(Self::File {
                path: PathBuf::new(),
                gzip: false,
            }),
            "sql" => Some(Self::Sql {
                dialect: SqlDialectName::default(),
                table: default_table(),
            }),
            _ => None,
        }
    }
}

fn default_table() -> String {
    "Messages".to_string()
}

/// Audit trail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Append the audit stage to every pipeline.
    #[serde(default)]
    pub enabled: bool,

    /// Page size applied to queries that set no `take`.
    #[serde(default)]
    pub default_take: Option<usize>,

    /// Record store.
    #[serde(default)]
    pub store: AuditStoreConfig,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder.
    #[serde(default)]
    pub enabled: bool,

    /// Serve the scrape endpoint on this address; render-only when unset.
    #[serde(default)]
    pub addr: Option<String>,

    /// Histogram bucket boundaries for message duration, in seconds.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: None,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter directive (`info`, `courier_middleware=debug,warn`, ...).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name attached to logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "courier".to_string()
}

fn default_true() -> bool {
    true
}
