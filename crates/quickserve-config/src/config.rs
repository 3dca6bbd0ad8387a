//! Main configuration type.
//!
//! This module provides the top-level [`QuickServeConfig`] struct, its
//! presets, and cross-section validation.

use std::collections::HashSet;

use quickserve_auth::AuthConfig;
use quickserve_core::{EntityConfig, EntityRegistry};
use quickserve_telemetry::{LogConfig, TelemetryConfig};
use serde::Deserialize;

use crate::{ConfigError, DatabaseConfig, ServerConfig, ServerKind};

/// Complete QuickServe configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from
/// files and environment variables.
///
/// # Example
///
/// ```
/// use quickserve_config::QuickServeConfig;
///
/// let config = QuickServeConfig::default();
/// assert_eq!(config.servers[0].addr(), "0.0.0.0:8080");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickServeConfig {
    /// Servers to start.
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,

    /// Database bindings.
    #[serde(default = "default_databases")]
    pub databases: Vec<DatabaseConfig>,

    /// Entity declarations.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    /// Authentication strategies and permission rules.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for QuickServeConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            databases: default_databases(),
            entities: Vec::new(),
            auth: AuthConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig::default()]
}

fn default_databases() -> Vec<DatabaseConfig> {
    vec![DatabaseConfig::default()]
}

fn check_unique<'a>(
    section: &'static str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(ConfigError::invalid(
                format!("{section}.name"),
                "must not be empty",
            ));
        }
        if !seen.insert(name) {
            return Err(ConfigError::Duplicate {
                section,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

impl QuickServeConfig {
    /// Create a development configuration preset: debug level, pretty logs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::development();
        config
    }

    /// Create a production configuration preset: info level, JSON logs.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::production();
        config
    }

    /// Builds the entity registry declared by this configuration.
    pub fn entity_registry(&self) -> EntityRegistry {
        EntityRegistry::from_configs(self.entities.iter().cloned())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - No server is configured, or two servers or databases share a name
    /// - A port is 0, a body limit is 0, or a timeout is invalid or zero
    /// - A REST or socket server names no database, or an unknown one
    /// - A server exposes an undeclared entity
    /// - An auth strategy is incomplete or refers to an undeclared entity
    /// - The metrics address is invalid while metrics are enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        check_unique("server", self.servers.iter().map(|s| s.name.as_str()))?;
        check_unique("database", self.databases.iter().map(|d| d.name.as_str()))?;
        check_unique("entity", self.entities.iter().map(|e| e.name.as_str()))?;

        let registry = self.entity_registry();

        for server in &self.servers {
            let field = |key: &str| format!("servers.{}.{key}", server.name);

            if server.port == 0 {
                return Err(ConfigError::invalid(field("port"), "must not be 0"));
            }
            if server.request.limit == 0 {
                return Err(ConfigError::invalid(
                    field("request.limit"),
                    "must be at least 1",
                ));
            }
            if server.request.timeout()?.is_zero() {
                return Err(ConfigError::invalid(
                    field("request.timeout"),
                    "must be greater than zero",
                ));
            }

            match (&server.database, server.kind) {
                (Some(db), _) if !self.databases.iter().any(|d| &d.name == db) => {
                    return Err(ConfigError::unknown(field("database"), "database", db));
                }
                (None, ServerKind::Rest | ServerKind::Socket) => {
                    return Err(ConfigError::invalid(
                        field("database"),
                        format!("required for {} servers", server.kind.as_str()),
                    ));
                }
                _ => {}
            }

            for entity in server.entities.iter().flatten() {
                if registry.get(entity).is_none() {
                    return Err(ConfigError::unknown(field("entities"), "entity", entity));
                }
            }
        }

        self.auth.validate()?;
        self.validate_auth_entities(&registry)?;

        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        Ok(())
    }

    fn validate_auth_entities(&self, registry: &EntityRegistry) -> Result<(), ConfigError> {
        let strategies = &self.auth.strategies;
        let referenced = strategies
            .jwt
            .iter()
            .map(|jwt| ("auth.strategies.jwt.entity", jwt.entity.name.as_str()))
            .chain(
                strategies
                    .oauth
                    .values()
                    .map(|p| ("auth.strategies.oauth.entity", p.entity.name.as_str())),
            );
        for (field, entity) in referenced {
            if registry.get(entity).is_none() {
                return Err(ConfigError::unknown(field, "entity", entity));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> QuickServeConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_is_valid() {
        let config = QuickServeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.databases[0].name, "main");
    }

    #[test]
    fn test_presets() {
        assert_eq!(QuickServeConfig::development().telemetry.logging.level, "debug");
        assert!(QuickServeConfig::production().telemetry.logging.json);
    }

    #[test]
    fn test_unknown_database_rejected() {
        let config = config(json!({
            "servers": [{"name": "api", "database": "missing"}]
        }));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown database 'missing'"));
    }

    #[test]
    fn test_rest_server_needs_database_but_file_server_does_not() {
        let missing = config(json!({"servers": [{"name": "api"}]}));
        assert!(missing.validate().is_err());

        let files = config(json!({"servers": [{"name": "static", "type": "file"}]}));
        assert!(files.validate().is_ok());
    }

    #[test]
    fn test_duplicate_server_names_rejected() {
        let config = config(json!({
            "servers": [
                {"name": "api", "database": "main"},
                {"name": "api", "database": "main", "port": 8081}
            ]
        }));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duplicate { section: "server", .. })
        ));
    }

    #[test]
    fn test_exposed_entities_must_exist() {
        let config = config(json!({
            "servers": [{"name": "api", "database": "main", "entities": ["users"]}],
            "entities": [{"name": "people", "alias": "users"}]
        }));
        assert!(config.validate().is_ok());

        let config = QuickServeConfig {
            entities: Vec::new(),
            ..config
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_strategy_entity_must_exist() {
        let config = config(json!({
            "auth": {
                "strategies": {
                    "jwt": {
                        "secret": "s",
                        "entity": {"name": "users", "identifiers": ["email"]}
                    }
                }
            }
        }));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown entity 'users'"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = config(json!({
            "servers": [{"name": "api", "database": "main", "request": {"timeout": "0s"}}]
        }));
        assert!(config.validate().is_err());
    }
}
