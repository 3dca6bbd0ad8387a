//! Error types for QuickServe.
//!
//! This module provides the [`QuickError`] type, the single error type that
//! crosses the middleware chain boundary. Every variant maps to exactly one
//! HTTP status code and renders into the same [`ErrorEnvelope`] body:
//!
//! | Variant | Status |
//! |---|---|
//! | `Validation` | 400 (with an `errors` list) |
//! | `BadRequest` | 400 |
//! | `Unauthenticated` | 401 |
//! | `Forbidden` | 403 |
//! | `NotFound` | 404 |
//! | `Timeout` | 408 |
//! | `Upstream` | 502 (detail is logged, never rendered) |
//! | `Internal` | 500 (source is logged, never rendered) |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`QuickError`].
pub type QuickResult<T> = Result<T, QuickError>;

/// Message rendered for every upstream failure.
pub const UPSTREAM_MESSAGE: &str = "Upstream provider request failed";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Entity field validation failed.
    Validation,
    /// Malformed or incomplete request input.
    BadRequest,
    /// Invalid or missing credentials.
    Authentication,
    /// Authorization denied.
    Authorization,
    /// No route or resource matched.
    NotFound,
    /// The request deadline elapsed.
    Timeout,
    /// A delegated provider call failed.
    Upstream,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation | Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable code rendered in error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_FAILED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Authentication => "UNAUTHENTICATED",
            Self::Authorization => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::Upstream => "UPSTREAM_FAILURE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Standard error type for QuickServe.
///
/// # Example
///
/// ```
/// use quickserve_core::{QuickError, ErrorCategory};
///
/// fn require_code(code: Option<&str>) -> Result<&str, QuickError> {
///     code.ok_or_else(|| QuickError::bad_request("Missing authorization code"))
/// }
///
/// let err = require_code(None).unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::BadRequest);
/// ```
#[derive(Error, Debug)]
pub enum QuickError {
    /// Entity validation failed.
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
        /// One entry per failed field rule.
        errors: Vec<String>,
    },

    /// Malformed request input.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
    },

    /// Login or exchange rejected the presented credentials.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// Route or resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
        /// The type of resource that was not found.
        resource_type: Option<String>,
        /// The identifier of the resource.
        resource_id: Option<String>,
    },

    /// The request deadline elapsed before a response was produced.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// A delegated provider call failed.
    #[error("Upstream failure: {message}")]
    Upstream {
        /// Detail for logs. Never rendered to clients.
        message: String,
        /// The provider that failed.
        service: Option<String>,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl QuickError {
    /// Creates a validation error from a list of field errors.
    #[must_use]
    pub fn validation(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors,
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Creates a not found error with resource context.
    #[must_use]
    pub fn not_found_resource(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self::NotFound {
            message: format!("{resource_type} with ID '{resource_id}' not found"),
            resource_type: Some(resource_type),
            resource_id: Some(resource_id),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an upstream failure for the named provider.
    pub fn upstream(
        service: impl Into<String>,
        message: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            service: Some(service.into()),
            source,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::BadRequest { .. } => ErrorCategory::BadRequest,
            Self::Unauthenticated { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Upstream { .. } => ErrorCategory::Upstream,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns the message that is safe to show a client.
    #[must_use]
    pub fn client_message(&self) -> &str {
        match self {
            Self::Upstream { .. } => UPSTREAM_MESSAGE,
            Self::Validation { message, .. }
            | Self::BadRequest { message }
            | Self::Unauthenticated { message }
            | Self::Forbidden { message }
            | Self::NotFound { message, .. }
            | Self::Timeout { message }
            | Self::Internal { message, .. } => message,
        }
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        let errors = match self {
            Self::Validation { errors, .. } => Some(errors.clone()),
            _ => None,
        };
        ErrorEnvelope {
            message: self.client_message().to_string(),
            code: self.category().code().to_string(),
            errors,
            request_id: request_id.map(ToString::to_string),
        }
    }
}

impl From<serde_json::Error> for QuickError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_with_source("Serialization failed", err)
    }
}

/// Serializable error body shared by every transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error code.
    pub code: String,
    /// Field errors, present only for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_carries_errors() {
        let error = QuickError::validation(
            "Invalid user",
            vec!["email is required".to_string(), "age must be a number".to_string()],
        );
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let envelope = error.to_envelope(None);
        assert_eq!(envelope.errors.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_timeout_is_408() {
        let error = QuickError::timeout("Request timed out");
        assert_eq!(error.status_code(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_upstream_detail_is_hidden() {
        let error = QuickError::upstream(
            "github",
            "token endpoint returned 500: secret-laden body",
            None,
        );
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(error.client_message(), UPSTREAM_MESSAGE);
        assert!(!error.to_envelope(None).message.contains("secret"));
    }

    #[test]
    fn test_internal_source_is_hidden() {
        let error = QuickError::internal_with_source(
            "Database unavailable",
            anyhow::anyhow!("connection refused at 10.0.0.3"),
        );
        let envelope = error.to_envelope(Some("req-1"));
        assert_eq!(envelope.message, "Database unavailable");
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_not_found_resource() {
        let error = QuickError::not_found_resource("users", "42");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(error.client_message().contains("42"));
    }

    #[test]
    fn test_envelope_omits_errors_unless_validation() {
        let json = serde_json::to_string(&QuickError::forbidden("Forbidden").to_envelope(None))
            .expect("serialization should work");
        assert_eq!(json, r#"{"message":"Forbidden","code":"FORBIDDEN"}"#);
    }

    #[test]
    fn test_all_error_categories_have_status_codes() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::BadRequest,
            ErrorCategory::Authentication,
            ErrorCategory::Authorization,
            ErrorCategory::NotFound,
            ErrorCategory::Timeout,
            ErrorCategory::Upstream,
            ErrorCategory::Internal,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }
}
