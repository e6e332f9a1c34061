//! Typed configuration for Courier.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`CourierConfig`] has three sections:
//!
//! - [`PipelineConfig`] - error preservation, property resolving, handler naming
//! - [`AuditConfig`] - whether and where processed messages are recorded
//! - [`TelemetryConfigSection`] - logging and metrics
//!
//! The values are plain data. Pipelines receive them as explicit options when
//! they are built; nothing here is process-wide state.
//!
//! # Example
//!
//! ```no_run
//! use courier_config::ConfigLoader;
//!
//! # fn main() -> Result<(), courier_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("courier.toml")?
//!     .with_env_prefix("COURIER")
//!     .load()?;
//!
//! println!("audit store: {}", config.audit.store.kind());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! preserve_original_error = false
//! use_properties_resolving = true
//!
//! [pipeline.handler_search]
//! mode = "suffix"
//! container_suffix = "Handlers"
//! method_prefix = "Handle"
//!
//! [audit]
//! enabled = true
//! default_take = 1000
//!
//! [audit.store]
//! kind = "sql"
//! dialect = "bracket"
//! table = "Messages"
//!
//! [telemetry]
//! service_name = "billing"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values are overridden with variables named `PREFIX__SECTION__KEY`:
//!
//! - `COURIER__PIPELINE__PRESERVE_ORIGINAL_ERROR=true`
//! - `COURIER__AUDIT__STORE__KIND=file`
//! - `COURIER__AUDIT__STORE__PATH=/var/log/courier/audit.log`
//! - `COURIER__TELEMETRY__LOGGING__LEVEL=debug`
//!
//! Unknown keys under the prefix are rejected.

#![doc(html_root_url = "https://docs.rs/courier-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_file_format_parses() {
        let toml = r#"
            [pipeline]
            use_properties_resolving = true

            [pipeline.handler_search]
            mode = "suffix"

            [audit]
            enabled = true
            default_take = 1000

            [audit.store]
            kind = "sql"
            dialect = "bracket"
            table = "Messages"

            [telemetry.metrics]
            enabled = true
            addr = "0.0.0.0:9090"
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.pipeline.use_properties_resolving);
        assert_eq!(config.audit.store.kind(), "sql");
        assert_eq!(config.telemetry.metrics.addr.as_deref(), Some("0.0.0.0:9090"));
    }
}
