//! Configuration error types.

use quickserve_auth::AuthError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded or accepted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension or format name is neither TOML nor JSON.
    #[error("unsupported configuration format '{0}' (expected toml or json)")]
    UnsupportedFormat(String),

    /// Malformed TOML, including unknown keys.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, including unknown keys.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No `[[servers]]` entry.
    #[error("at least one server must be configured")]
    NoServers,

    /// Two servers, databases or entities share a name.
    #[error("{section} '{name}' is declared more than once")]
    Duplicate {
        /// `server`, `database` or `entity`.
        section: &'static str,
        /// The repeated name.
        name: String,
    },

    /// A server or strategy names a database or entity that is not declared.
    #[error("{field} refers to unknown {kind} '{name}'")]
    UnknownReference {
        /// Dotted path of the offending key.
        field: String,
        /// `database` or `entity`.
        kind: &'static str,
        /// The name that could not be resolved.
        name: String,
    },

    /// A value is out of range or malformed.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The auth section is inconsistent.
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    /// A `QUICKSERVE_*` override could not be parsed.
    #[error("environment override {var}: {reason}")]
    EnvOverride {
        /// Variable name.
        var: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(field: impl Into<String>, kind: &'static str, name: &str) -> Self {
        Self::UnknownReference {
            field: field.into(),
            kind,
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_reference_message() {
        let err = ConfigError::unknown("servers.api.database", "database", "main");
        assert_eq!(
            err.to_string(),
            "servers.api.database refers to unknown database 'main'"
        );
    }

    #[test]
    fn test_duplicate_message() {
        let err = ConfigError::Duplicate {
            section: "server",
            name: "api".into(),
        };
        assert_eq!(err.to_string(), "server 'api' is declared more than once");
    }

    #[test]
    fn test_env_override_names_variable() {
        let err = ConfigError::EnvOverride {
            var: "QUICKSERVE_LOG_JSON".into(),
            reason: "expected boolean".into(),
        };
        assert!(err.to_string().contains("QUICKSERVE_LOG_JSON"));
    }
}
