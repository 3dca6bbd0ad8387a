//! Error types for the auth crate.

use quickserve_core::QuickError;
use thiserror::Error;

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur while issuing, verifying, or exchanging tokens.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No identity matched the presented identifiers.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No bearer token was presented.
    #[error("Token is missing")]
    MissingToken,

    /// The refresh token is malformed, expired, or unknown.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// The identity a refresh token names no longer exists.
    #[error("Invalid user")]
    UnknownIdentity,

    /// A required request parameter was absent.
    #[error("Missing required parameters")]
    MissingParameters,

    /// The named provider is not configured.
    #[error("Invalid OAuth provider")]
    UnknownProvider(String),

    /// The provider answered without a usable token or identity.
    #[error("{0}")]
    ProviderRejected(String),

    /// The provider could not be reached or answered with a server error.
    #[error("provider {provider} request failed")]
    Upstream {
        /// Provider name.
        provider: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The requested strategy is not configured.
    #[error("strategy '{0}' is not configured")]
    StrategyNotConfigured(&'static str),

    /// A token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// The auth configuration is invalid.
    #[error("invalid auth configuration: {0}")]
    InvalidConfig(String),

    /// A storage or serialization call failed.
    #[error(transparent)]
    Core(#[from] QuickError),
}

impl AuthError {
    /// Create an upstream error for `provider`.
    pub fn upstream(provider: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            source: source.into(),
        }
    }
}

impl From<AuthError> for QuickError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidRefreshToken
            | AuthError::UnknownIdentity => Self::unauthenticated(err.to_string()),
            AuthError::MissingParameters
            | AuthError::UnknownProvider(_)
            | AuthError::ProviderRejected(_) => Self::bad_request(err.to_string()),
            AuthError::Upstream { provider, source } => Self::upstream(
                provider,
                "Provider request failed",
                Some(source),
            ),
            AuthError::StrategyNotConfigured(_) => Self::not_found("Not Found"),
            AuthError::Signing(source) => Self::internal_with_source("Token signing failed", source),
            AuthError::InvalidConfig(message) => Self::internal(message),
            AuthError::Core(err) => err,
        }
    }
}
