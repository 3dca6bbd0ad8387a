//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, QuickServeConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use quickserve_config::ConfigLoader;
///
/// # fn main() -> Result<(), quickserve_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("quickserve.toml")?
///     .with_env_prefix("QUICKSERVE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: QuickServeConfig,
    env_prefix: Option<String>,
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
            config: QuickServeConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = QuickServeConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use quickserve_config::ConfigLoader;
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
        self.config = QuickServeConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = QuickServeConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats.
    /// The file format is determined by the file extension.
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
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.config = Self::parse_file(&content, path)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
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

    /// Load configuration from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or `format` is neither
    /// `"toml"` nor `"json"`.
    ///
    /// # Example
    ///
    /// ```
    /// use quickserve_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [[servers]]
    ///     name = "api"
    ///     port = 3000
    ///     database = "main"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.servers[0].port, 3000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat(format.to_string()))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// With prefix `"QUICKSERVE"` the loader reads:
    /// - `QUICKSERVE_LOG_LEVEL`
    /// - `QUICKSERVE_LOG_JSON`
    /// - `QUICKSERVE_JWT_SECRET`
    /// - `QUICKSERVE_METRICS_ENABLED`
    /// - `QUICKSERVE_METRICS_ADDR`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        self
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the final configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<QuickServeConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> QuickServeConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<QuickServeConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(
                extension.unwrap_or_else(|| path.display().to_string()),
            )),
        }
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        let prefix = format!("{prefix}_");
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(&prefix) {
                self.apply_env_var(&key, name, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, name: &str, value: &str) -> Result<(), ConfigError> {
        let not_bool = || ConfigError::EnvOverride {
            var: key.to_string(),
            reason: "expected boolean".into(),
        };
        match name {
            "LOG_LEVEL" => {
                self.config.telemetry.logging.level = value.to_string();
            }
            "LOG_JSON" => {
                self.config.telemetry.logging.json = parse_bool(value)
                    .ok_or_else(not_bool)?;
            }
            "METRICS_ENABLED" => {
                self.config.telemetry.metrics.enabled = parse_bool(value)
                    .ok_or_else(not_bool)?;
            }
            "METRICS_ADDR" => {
                self.config.telemetry.metrics.addr = value.to_string();
            }
            "JWT_SECRET" => match self.config.auth.strategies.jwt.as_mut() {
                Some(jwt) => jwt.secret = value.to_string(),
                None => {
                    tracing::warn!(var = key, "Ignoring secret override: no jwt strategy configured");
                }
            },
            _ => {}
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
