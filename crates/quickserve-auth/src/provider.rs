//! Delegated provider calls.
//!
//! The [`ProviderClient`] trait is the seam between the authentication
//! engine and the network: [`HttpProviderClient`] talks to real
//! authorization servers with `reqwest`, tests substitute a recording double.

use crate::config::ProviderStrategy;
use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderTokens {
    /// Provider access token. Absent when the provider rejected the grant.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Provider refresh token, if issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Provider access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Calls a delegated provider's token and user info endpoints.
#[async_trait]
pub trait ProviderClient: Send + Sync + 'static {
    /// Exchanges an authorization code (`grant_type=authorization_code`).
    async fn exchange_code(
        &self,
        name: &str,
        provider: &ProviderStrategy,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<ProviderTokens>;

    /// Exchanges a refresh token (`grant_type=refresh_token`).
    async fn refresh(
        &self,
        name: &str,
        provider: &ProviderStrategy,
        refresh_token: &str,
    ) -> AuthResult<ProviderTokens>;

    /// Fetches the user's claims with bearer auth.
    async fn user_info(
        &self,
        name: &str,
        provider: &ProviderStrategy,
        access_token: &str,
    ) -> AuthResult<Map<String, Value>>;
}

/// [`ProviderClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    client: reqwest::Client,
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl HttpProviderClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn post_form(
        &self,
        name: &str,
        url: &str,
        form: &[(&str, &str)],
    ) -> AuthResult<ProviderTokens> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::upstream(name, e))?;

        // 4xx bodies carry an error object without `access_token`; the
        // caller reports those as a rejected grant.
        if response.status().is_server_error() {
            return Err(AuthError::upstream(
                name,
                anyhow::anyhow!("token endpoint answered {}", response.status()),
            ));
        }
        response
            .json::<ProviderTokens>()
            .await
            .map_err(|e| AuthError::upstream(name, e))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn exchange_code(
        &self,
        name: &str,
        provider: &ProviderStrategy,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<ProviderTokens> {
        tracing::debug!(provider = name, "Exchanging authorization code");
        self.post_form(
            name,
            &provider.token_url,
            &[
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
                ("client_secret", &provider.client_secret),
                ("client_id", &provider.client_id),
                ("code", code),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        name: &str,
        provider: &ProviderStrategy,
        refresh_token: &str,
    ) -> AuthResult<ProviderTokens> {
        tracing::debug!(provider = name, "Refreshing provider token");
        self.post_form(
            name,
            &provider.token_url,
            &[
                ("refresh_token", refresh_token),
                ("client_secret", &provider.client_secret),
                ("grant_type", "refresh_token"),
                ("client_id", &provider.client_id),
            ],
        )
        .await
    }

    async fn user_info(
        &self,
        name: &str,
        provider: &ProviderStrategy,
        access_token: &str,
    ) -> AuthResult<Map<String, Value>> {
        let response = self
            .client
            .get(&provider.user_info_url)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::upstream(name, e))?;

        match response
            .json::<Value>()
            .await
            .map_err(|e| AuthError::upstream(name, e))?
        {
            Value::Object(claims) => Ok(claims),
            _ => Err(AuthError::ProviderRejected(
                "Provider returned invalid user info".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_tolerate_error_bodies() {
        let tokens: ProviderTokens =
            serde_json::from_str(r#"{"error": "invalid_grant"}"#).unwrap();
        assert_eq!(tokens, ProviderTokens::default());

        let tokens: ProviderTokens = serde_json::from_str(
            r#"{"access_token": "at", "refresh_token": "rt", "expires_in": 3599, "token_type": "Bearer"}"#,
        )
        .unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("at"));
        assert_eq!(tokens.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_upstream_failure() {
        let provider: ProviderStrategy = serde_json::from_value(serde_json::json!({
            "clientId": "id",
            "clientSecret": "secret",
            "authUrl": "http://127.0.0.1:1/auth",
            "tokenUrl": "http://127.0.0.1:1/token",
            "userInfoUrl": "http://127.0.0.1:1/me",
            "entity": { "name": "users", "identifier": "email" }
        }))
        .unwrap();

        let client = HttpProviderClient::new(Duration::from_secs(2));
        let err = client
            .exchange_code("local", &provider, "code", "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Upstream { .. }));
    }
}
