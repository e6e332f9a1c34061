//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    AuditStoreConfig, ConfigError, CourierConfig, HandlerSearchMode, LogFormat, SqlDialectName,
};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values or a preset
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use courier_config::ConfigLoader;
///
/// # fn main() -> Result<(), courier_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("courier.toml")?
///     .with_env_prefix("COURIER")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: CourierConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CourierConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = CourierConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use courier_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = CourierConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = CourierConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use courier_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [pipeline]
    ///     preserve_original_error = true
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.pipeline.preserve_original_error);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::unsupported_format(format)),
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `COURIER__AUDIT__STORE__KIND=sql` or
    /// `COURIER__PIPELINE__HANDLER_SEARCH__MODE=suffix`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file exists but cannot be read.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(dotenvy::Error::Io(e)) => Err(ConfigError::read_error(".env", e)),
            Err(e) => Err(ConfigError::env_parse_error(".env", e.to_string())),
        }
    }

    /// Returns `true` if a configuration file was loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable is malformed or names
    /// an unknown key, or if validation fails.
    pub fn load(mut self) -> Result<CourierConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> CourierConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<CourierConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::unsupported_format(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
        // KIND picks the store variant; it must land before the variant's settings.
        vars.sort_by_key(|(k, _)| !k.ends_with("__AUDIT__STORE__KIND"));

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let boolean = || {
            parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
        };

        match parts.as_slice() {
            // Pipeline section
            ["PIPELINE", "PRESERVE_ORIGINAL_ERROR"] => {
                self.config.pipeline.preserve_original_error = boolean()?;
            }
            ["PIPELINE", "USE_PROPERTIES_RESOLVING"] => {
                self.config.pipeline.use_properties_resolving = boolean()?;
            }
            ["PIPELINE", "HANDLER_SEARCH", "MODE"] => {
                self.config.pipeline.handler_search.mode = HandlerSearchMode::parse(value)
                    .ok_or_else(|| {
                        ConfigError::env_parse_error(key, "expected 'marked' or 'suffix'")
                    })?;
            }
            ["PIPELINE", "HANDLER_SEARCH", "CONTAINER_SUFFIX"] => {
                self.config.pipeline.handler_search.container_suffix = value.to_string();
            }
            ["PIPELINE", "HANDLER_SEARCH", "METHOD_PREFIX"] => {
                self.config.pipeline.handler_search.method_prefix = value.to_string();
            }
            ["PIPELINE", "HANDLER_SEARCH", "METHOD_NAME"] => {
                self.config.pipeline.handler_search.method_name = optional(value);
            }

            // Audit section
            ["AUDIT", "ENABLED"] => {
                self.config.audit.enabled = boolean()?;
            }
            ["AUDIT", "DEFAULT_TAKE"] => {
                self.config.audit.default_take = match optional(value) {
                    None => None,
                    Some(take) => Some(take.parse().map_err(|_| {
                        ConfigError::env_parse_error(key, "expected integer or 'none'")
                    })?),
                };
            }
            ["AUDIT", "STORE", "KIND"] => {
                if self.config.audit.store.kind() != value.to_lowercase() {
                    self.config.audit.store =
                        AuditStoreConfig::of_kind(value).ok_or_else(|| {
                            ConfigError::env_parse_error(key, "expected 'memory', 'file' or 'sql'")
                        })?;
                }
            }
            ["AUDIT", "STORE", "PATH"] => match &mut self.config.audit.store {
                AuditStoreConfig::File { path, .. } => *path = PathBuf::from(value),
                other => return Err(ConfigError::store_mismatch("audit.store.path", other.kind())),
            },
            ["AUDIT", "STORE", "GZIP"] => {
                let enabled = boolean()?;
                match &mut self.config.audit.store {
                    AuditStoreConfig::File { gzip, .. } => *gzip = enabled,
                    other => {
                        return Err(ConfigError::store_mismatch("audit.store.gzip", other.kind()))
                    }
                }
            }
            ["AUDIT", "STORE", "DIALECT"] => {
                let parsed = SqlDialectName::parse(value).ok_or_else(|| {
                    ConfigError::env_parse_error(key, "expected 'bracket', 'backtick' or 'plain'")
                })?;
                match &mut self.config.audit.store {
                    AuditStoreConfig::Sql { dialect, .. } => *dialect = parsed,
                    other => {
                        return Err(ConfigError::store_mismatch(
                            "audit.store.dialect",
                            other.kind(),
                        ))
                    }
                }
            }
            ["AUDIT", "STORE", "TABLE"] => match &mut self.config.audit.store {
                AuditStoreConfig::Sql { table, .. } => *table = value.to_string(),
                other => {
                    return Err(ConfigError::store_mismatch("audit.store.table", other.kind()))
                }
            },

            // Telemetry section
            ["TELEMETRY", "SERVICE_NAME"] => {
                self.config.telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = boolean()?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                self.config.telemetry.logging.ansi_enabled = boolean()?;
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                self.config.telemetry.logging.include_location = boolean()?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                self.config.telemetry.metrics.enabled = boolean()?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                self.config.telemetry.metrics.addr = optional(value);
            }

            [section @ .., field] => {
                return Err(ConfigError::unknown_field(
                    field.to_lowercase(),
                    section.join(".").to_lowercase(),
                ));
            }
            [] => return Err(ConfigError::env_parse_error(key, "invalid key format")),
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Empty or `none` clears an optional setting.
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}
