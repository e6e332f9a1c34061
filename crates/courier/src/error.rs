//! Errors raised while assembling a [`Courier`](crate::Courier).

use courier_audit::AuditError;
use courier_config::ConfigError;
use courier_core::PipelineError;
use courier_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised by the facade.
#[derive(Debug, Error)]
pub enum CourierError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The handler registry or a pipeline chain could not be built.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The audit store failed.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Logging or metrics could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The configured audit store needs a component that was not supplied.
    #[error("audit store '{store}' requires {component}")]
    MissingComponent {
        /// Configured store kind.
        store: &'static str,
        /// What is missing.
        component: &'static str,
    },
}

/// Result alias for facade operations.
pub type CourierResult<T> = Result<T, CourierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_component_display() {
        let err = CourierError::MissingComponent {
            store: "sql",
            component: "an SQL executor",
        };
        assert_eq!(err.to_string(), "audit store 'sql' requires an SQL executor");
    }

    #[test]
    fn test_wrapped_errors_are_transparent() {
        let err = CourierError::from(ConfigError::MissingField {
            field: "audit.store.path".into(),
        });
        assert_eq!(
            err.to_string(),
            ConfigError::MissingField {
            field: "audit.store.path".into(),
        }.to_string()
        );
    }
}
