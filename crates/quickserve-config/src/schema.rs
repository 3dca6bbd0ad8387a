//! Configuration schema types.
//!
//! This module defines the structure of the `servers` and `databases`
//! sections. Entities, auth, and telemetry reuse the types of the crates
//! that consume them.

use quickserve_auth::token::parse_duration;
use quickserve_core::ResponseFormat;
use serde::Deserialize;
use std::time::Duration;

use crate::ConfigError;

/// What a server exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// HTTP REST API.
    #[default]
    Rest,
    /// WebSocket message API.
    Socket,
    /// Static files. Authorization is skipped unless the server is `secure`.
    File,
}

impl ServerKind {
    /// Returns the lowercase kind name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Socket => "socket",
            Self::File => "file",
        }
    }
}

/// Per-request limits.
///
/// # Example
///
/// ```
/// use quickserve_config::RequestLimits;
///
/// let limits = RequestLimits::default();
/// assert_eq!(limits.limit, 10);
/// assert_eq!(limits.timeout().unwrap().as_secs(), 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestLimits {
    /// Maximum body size in megabytes.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Request deadline, e.g. `"60s"` or `"500ms"`.
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            timeout: default_timeout(),
        }
    }
}

impl RequestLimits {
    /// Returns the parsed request deadline.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.timeout)
            .map_err(|e| ConfigError::invalid("request.timeout", e.to_string()))
    }

    /// Returns the body limit in bytes.
    pub fn limit_bytes(&self) -> usize {
        usize::try_from(self.limit)
            .unwrap_or(usize::MAX)
            .saturating_mul(1024 * 1024)
    }
}

fn default_limit() -> u32 {
    10
}

fn default_timeout() -> String {
    "60s".to_string()
}

/// One server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Unique server name.
    pub name: String,

    /// Server kind.
    #[serde(rename = "type", default)]
    pub kind: ServerKind,

    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL used to build callback links. Derived from host and
    /// port when unset.
    #[serde(default)]
    pub base_path: Option<String>,

    /// Response format.
    #[serde(default)]
    pub format: ResponseFormat,

    /// Name of the database requests are served from.
    #[serde(default)]
    pub database: Option<String>,

    /// Apply authorization to file servers too.
    #[serde(default)]
    pub secure: bool,

    /// Per-request limits.
    #[serde(default)]
    pub request: RequestLimits,

    /// Entities exposed through generated routes. All entities when unset.
    #[serde(default)]
    pub entities: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "api".to_string(),
            kind: ServerKind::Rest,
            host: default_host(),
            port: default_port(),
            base_path: None,
            format: ResponseFormat::Json,
            database: Some(default_database()),
            secure: false,
            request: RequestLimits::default(),
            entities: None,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the public base URL.
    pub fn base_path(&self) -> String {
        self.base_path
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    /// Returns `true` if `entity` is exposed by this server.
    pub fn exposes(&self, entity: &str) -> bool {
        self.entities
            .as_ref()
            .map_or(true, |names| names.iter().any(|name| name == entity))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

pub(crate) fn default_database() -> String {
    "main".to_string()
}

/// Storage engine of a database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum DatabaseKind {
    /// Process-local maps.
    #[default]
    #[serde(rename = "in-memory")]
    InMemory,
}

/// One database binding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Unique database name servers refer to.
    pub name: String,

    /// Storage engine.
    #[serde(rename = "type", default)]
    pub kind: DatabaseKind,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_database(),
            kind: DatabaseKind::InMemory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server: ServerConfig = toml::from_str(r#"name = "api""#).unwrap();
        assert_eq!(server.kind, ServerKind::Rest);
        assert_eq!(server.addr(), "0.0.0.0:8080");
        assert_eq!(server.base_path(), "http://0.0.0.0:8080");
        assert_eq!(server.request, RequestLimits::default());
        assert!(server.exposes("anything"));
    }

    #[test]
    fn test_server_kinds_and_exposed_entities() {
        let server: ServerConfig = toml::from_str(
            r#"
            name = "files"
            type = "file"
            secure = true
            entities = ["users"]
            "#,
        )
        .unwrap();
        assert_eq!(server.kind, ServerKind::File);
        assert!(server.exposes("users"));
        assert!(!server.exposes("posts"));
    }

    #[test]
    fn test_request_limits() {
        let limits = RequestLimits {
            limit: 2,
            timeout: "250ms".to_string(),
        };
        assert_eq!(limits.timeout().unwrap(), Duration::from_millis(250));
        assert_eq!(limits.limit_bytes(), 2 * 1024 * 1024);

        let bad = RequestLimits {
            timeout: "soon".to_string(),
            ..RequestLimits::default()
        };
        assert!(matches!(bad.timeout(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_unknown_server_field_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str(
            r#"
            name = "api"
            colour = "blue"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_database_kind() {
        let db: DatabaseConfig = toml::from_str(
            r#"
            name = "main"
            type = "in-memory"
            "#,
        )
        .unwrap();
        assert_eq!(db.kind, DatabaseKind::InMemory);
    }
}
