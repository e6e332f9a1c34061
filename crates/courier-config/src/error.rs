//! Errors raised while assembling a [`CourierConfig`](crate::CourierConfig).

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
///
/// Failures that concern one setting name it with its dotted path
/// (`audit.store.table`), available through [`ConfigError::setting`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The requested path.
        path: PathBuf,
    },

    /// A configuration or `.env` file exists but could not be read.
    #[error("cannot read {path}")]
    ReadError {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A TOML document does not describe a courier configuration.
    #[error("invalid TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A JSON document does not describe a courier configuration.
    #[error("invalid JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The document format is neither TOML nor JSON.
    #[error("unsupported configuration format: {origin}")]
    UnsupportedFormat {
        /// The format name or the file path it was derived from.
        origin: String,
    },

    /// An environment override names a setting that does not exist.
    #[error("unknown setting {section}.{field}")]
    UnknownField {
        /// The unknown setting, lowercased.
        field: String,
        /// The dotted section the override addressed.
        section: String,
    },

    /// A setting holds a value the pipelines cannot work with.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted path of the setting.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A setting required by the selected options is empty.
    #[error("{field} is required")]
    MissingField {
        /// Dotted path of the setting.
        field: String,
    },

    /// An environment override could not be parsed.
    #[error("cannot parse {var}: {reason}")]
    EnvParseError {
        /// The variable name.
        var: String,
        /// What was expected.
        reason: String,
    },

    /// A store setting was given for a store of another kind.
    #[error("{field} does not apply to the '{kind}' audit store")]
    StoreMismatch {
        /// The setting that was given.
        field: String,
        /// The configured store kind.
        kind: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unsupported_format(origin: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            origin: origin.into(),
        }
    }

    pub(crate) fn unknown_field(field: impl Into<String>, section: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            section: section.into(),
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn store_mismatch(field: impl Into<String>, kind: &'static str) -> Self {
        Self::StoreMismatch {
            field: field.into(),
            kind,
        }
    }

    /// Returns the dotted path of the offending setting, if the failure
    /// concerns a single known setting.
    #[must_use]
    pub fn setting(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. }
            | Self::MissingField { field }
            | Self::StoreMismatch { field, .. } => Some(field),
            _ => None,
        }
    }
}
