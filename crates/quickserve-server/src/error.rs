//! Server error types.

use quickserve_auth::AuthError;
use quickserve_config::ConfigError;
use quickserve_core::QuickError;
use thiserror::Error;

/// Errors raised while assembling or running servers.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to the configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid auth configuration.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Failure inside the request core.
    #[error(transparent)]
    Core(#[from] QuickError),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("0.0.0.0:80"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = ServerError::from(ConfigError::NoServers);
        assert_eq!(err.to_string(), "at least one server must be configured");
    }
}
