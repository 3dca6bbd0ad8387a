//! Token issuance, verification, and refresh.
//!
//! The [`Authenticator`] serves the login, refresh, and delegated exchange
//! endpoints and backs the [`AuthenticationStage`], which resolves the
//! bearer token of every request into a [`Session`].
//!
//! Verification never rejects a request. A request whose token is missing,
//! unverifiable, expired without a way to refresh, or whose refresh fails
//! simply continues anonymously; authorization decides what it may do.
//!
//! ```text
//! Unauthenticated ──► Verifying ──► Authenticated
//!                         │
//!                         ├──► Refreshing ──► Authenticated
//!                         │         │
//!                         └─────────┴──► Unauthenticated (demoted)
//! ```

use crate::config::{AuthConfig, ProviderIdentity, ProviderStrategy, RefreshPolicy};
use crate::error::{AuthError, AuthResult};
use crate::provider::{HttpProviderClient, ProviderClient};
use crate::record::{self, AuthRecord, StrategyKind};
use crate::token::{
    duration_or, issue_pair, lifetime_secs, sign, verify_any, verify_signature, Claims, Clock,
    DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL,
};
use chrono::{DateTime, Utc};
use quickserve_core::{
    id_query, BoxFuture, Context, Database, DatabaseRegistry, EntityRegistry, QuickResult, Record,
    Session, SharedDatabase, Transport,
};
use quickserve_middleware::Stage;
use quickserve_telemetry::metrics::record_auth_outcome;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Why a request continued anonymously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demotion {
    /// No bearer token was presented.
    MissingToken,
    /// No configured secret verifies the token, or no auth record holds it.
    UnverifiableToken,
    /// The token expired and there is no provider or refresh token to renew it.
    ExpiredNoRefresh,
    /// The provider refused or failed to renew the token.
    RefreshFailed,
}

impl Demotion {
    /// Returns a stable label for logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::UnverifiableToken => "unverifiable_token",
            Self::ExpiredNoRefresh => "expired_no_refresh",
            Self::RefreshFailed => "refresh_failed",
        }
    }
}

/// Outcome of verifying a request's bearer token.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The token is valid.
    Authenticated(Session),
    /// The token expired and was renewed through its provider.
    Refreshed(Session),
    /// The request continues without identity.
    Anonymous(Demotion),
}

/// Extracts the bearer token of a request.
///
/// The `Authorization` header is used when present. Socket messages may
/// instead carry the raw token in a `token` parameter.
pub fn bearer_token(ctx: &Context) -> Option<String> {
    if let Some(header) = ctx.header("authorization") {
        return header
            .split_once(' ')
            .map(|(_, token)| token.trim().to_string())
            .filter(|token| !token.is_empty());
    }
    if ctx.transport() == Transport::Socket {
        return ctx.param_str("token").filter(|token| !token.is_empty());
    }
    None
}

/// Builds the callback URL a provider redirects back to.
pub fn callback_uri(base_path: &str, client: &str) -> String {
    format!(
        "{}/system/oauth/callback/{client}",
        base_path.trim_end_matches('/')
    )
}

fn expiry(now: i64, ttl: Duration) -> DateTime<Utc> {
    let at = now.saturating_add(lifetime_secs(ttl));
    DateTime::from_timestamp(at, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn refresh_ttl(policy: &RefreshPolicy) -> AuthResult<Option<Duration>> {
    if !policy.enabled {
        return Ok(None);
    }
    duration_or(policy.expiration.as_deref(), DEFAULT_REFRESH_TTL).map(Some)
}

fn map_claims(mapper: &indexmap::IndexMap<String, String>, info: Map<String, Value>) -> Record {
    if mapper.is_empty() {
        return info;
    }
    mapper
        .iter()
        .filter_map(|(from, to)| info.get(from).map(|value| (to.clone(), value.clone())))
        .collect()
}

/// Issues, verifies, and refreshes tokens.
pub struct Authenticator {
    config: Arc<AuthConfig>,
    databases: DatabaseRegistry,
    entities: Arc<EntityRegistry>,
    provider: Arc<dyn ProviderClient>,
    clock: Clock,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("jwt", &self.config.strategies.jwt.is_some())
            .field("providers", &self.config.strategies.oauth.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator that reaches providers over HTTP.
    pub fn new(
        config: Arc<AuthConfig>,
        databases: DatabaseRegistry,
        entities: Arc<EntityRegistry>,
    ) -> Self {
        Self {
            config,
            databases,
            entities,
            provider: Arc::new(HttpProviderClient::default()),
            clock: Clock::system(),
        }
    }

    /// Replaces the provider client.
    #[must_use]
    pub fn with_provider_client(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = provider;
        self
    }

    /// Replaces the clock used to judge expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn database(&self, ctx: &Context) -> AuthResult<SharedDatabase> {
        Ok(self.databases.get(ctx.database())?)
    }

    fn secure(&self, entity: &str, value: Value) -> Value {
        match self.entities.get(entity) {
            Some(entity) => entity.secure(value),
            None => value,
        }
    }

    /// Shared-secret login: `POST /system/auth`.
    pub async fn login(&self, ctx: &Context) -> AuthResult<Value> {
        let strategy = self
            .config
            .strategies
            .jwt
            .as_ref()
            .ok_or(AuthError::StrategyNotConfigured("jwt"))?;
        let entity = &strategy.entity.name;

        let mut query = Record::new();
        for key in &strategy.entity.identifiers {
            match ctx.body().get(key) {
                Some(value) if !value.is_null() => {
                    query.insert(key.clone(), value.clone());
                }
                _ => return Err(AuthError::InvalidCredentials),
            }
        }

        let db = self.database(ctx)?;
        let row = db
            .find_one(entity, &query)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let user_id = row.get("id").cloned().unwrap_or(Value::Null);
        let identity = self.secure(entity, Value::Object(row));

        let now = self.clock.now();
        let access_ttl = duration_or(strategy.expires_in.as_deref(), DEFAULT_ACCESS_TTL)?;
        let refresh_ttl = refresh_ttl(&strategy.refresh_token)?;
        let tokens = issue_pair(entity, identity, &strategy.secret, now, access_ttl, refresh_ttl)?;

        record::save(
            &*db,
            &AuthRecord {
                user_id,
                strategy: StrategyKind::Jwt,
                client: None,
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                created_at: self.clock.now_utc(),
                expires_at: expiry(now, access_ttl),
                refresh_expires_at: refresh_ttl.map(|ttl| expiry(now, ttl)),
            },
        )
        .await?;

        tracing::info!(entity = %entity, "Login successful");
        Ok(json!({ "message": "Login successful", "auth": tokens }))
    }

    /// Shared-secret refresh: `POST /system/auth/refresh` with the refresh
    /// token as bearer.
    pub async fn refresh(&self, ctx: &Context) -> AuthResult<Value> {
        let strategy = self
            .config
            .strategies
            .jwt
            .as_ref()
            .ok_or(AuthError::StrategyNotConfigured("jwt"))?;
        let entity = &strategy.entity.name;
        let presented = bearer_token(ctx).ok_or(AuthError::MissingToken)?;

        let now = self.clock.now();
        let claims = verify_signature(&presented, &strategy.secret)
            .filter(|claims| !claims.is_expired(now))
            .ok_or(AuthError::InvalidRefreshToken)?;

        let db = self.database(ctx)?;
        let existing = record::find_by_refresh_token(&*db, &presented)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let id = claims
            .identity()
            .and_then(|identity| identity.get("id"))
            .filter(|id| **id == existing.user_id)
            .cloned()
            .ok_or(AuthError::UnknownIdentity)?;
        let mut rows = db.get(entity, &id_query(id)).await?;
        if rows.len() != 1 {
            tracing::warn!(entity = %entity, matches = rows.len(), "Refresh identity is not unique");
            return Err(AuthError::UnknownIdentity);
        }
        let row = rows.remove(0);
        let identity = self.secure(entity, Value::Object(row));

        let access_ttl = duration_or(strategy.expires_in.as_deref(), DEFAULT_ACCESS_TTL)?;
        let refresh_ttl = duration_or(
            strategy.refresh_token.expiration.as_deref(),
            DEFAULT_REFRESH_TTL,
        )?;
        let tokens = issue_pair(
            entity,
            identity,
            &strategy.secret,
            now,
            access_ttl,
            Some(refresh_ttl),
        )?;

        let rotated = AuthRecord {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: expiry(now, access_ttl),
            refresh_expires_at: Some(expiry(now, refresh_ttl)),
            ..existing
        };
        record::replace_by_refresh_token(&*db, &presented, &rotated).await?;

        tracing::debug!(entity = %entity, "Token refreshed");
        Ok(json!({ "message": "Token refreshed successfully", "auth": tokens }))
    }

    /// Delegated authorization redirect: `GET /system/oauth/:client`.
    pub fn authorize_url(&self, ctx: &Context) -> AuthResult<Value> {
        let client = ctx
            .param_str("client")
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingParameters)?;
        let provider = self
            .config
            .strategies
            .provider(&client)
            .ok_or_else(|| AuthError::UnknownProvider(client.clone()))?;

        let location = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
            provider.auth_url,
            urlencoding::encode(&provider.client_id),
            urlencoding::encode(&callback_uri(ctx.base_path(), &client)),
            urlencoding::encode(&provider.scope),
        );
        Ok(json!({ "location": location }))
    }

    /// Delegated code exchange: `GET /system/oauth/callback/:client?code=`.
    ///
    /// Missing parameters and unknown providers fail before any network call.
    pub async fn callback(&self, ctx: &Context) -> AuthResult<Value> {
        let client = ctx.param_str("client").filter(|c| !c.is_empty());
        let code = ctx.param_str("code").filter(|c| !c.is_empty());
        let (Some(client), Some(code)) = (client, code) else {
            return Err(AuthError::MissingParameters);
        };
        let provider = self
            .config
            .strategies
            .provider(&client)
            .ok_or_else(|| AuthError::UnknownProvider(client.clone()))?;

        let redirect_uri = callback_uri(ctx.base_path(), &client);
        let grant = self
            .provider
            .exchange_code(&client, provider, &code, &redirect_uri)
            .await?;
        let provider_access = grant
            .access_token
            .ok_or_else(|| AuthError::ProviderRejected("Invalid access token".into()))?;
        let info = self
            .provider
            .user_info(&client, provider, &provider_access)
            .await?;

        let db = self.database(ctx)?;
        let row = self
            .ensure_identity(&*db, &provider.entity, map_claims(&provider.entity.mapper, info))
            .await?;
        let entity = &provider.entity.name;
        let user_id = row.get("id").cloned().unwrap_or(Value::Null);
        let identity = self.secure(entity, Value::Object(row));

        let now = self.clock.now();
        let access_ttl = duration_or(provider.expires_in.as_deref(), DEFAULT_ACCESS_TTL)?;
        let refresh_ttl = refresh_ttl(&provider.refresh_token)?;
        let tokens = issue_pair(
            entity,
            identity.clone(),
            &provider.client_secret,
            now,
            access_ttl,
            refresh_ttl,
        )?;

        record::save(
            &*db,
            &AuthRecord {
                user_id,
                strategy: StrategyKind::Oauth,
                client: Some(client.clone()),
                access_token: tokens.access_token.clone(),
                refresh_token: grant.refresh_token.or_else(|| tokens.refresh_token.clone()),
                created_at: self.clock.now_utc(),
                expires_at: expiry(now, access_ttl),
                refresh_expires_at: refresh_ttl.map(|ttl| expiry(now, ttl)),
            },
        )
        .await?;

        tracing::info!(provider = %client, entity = %entity, "Entity authenticated");
        Ok(json!({ "message": "Entity authenticated", "entity": identity, "auth": tokens }))
    }

    async fn ensure_identity(
        &self,
        db: &dyn Database,
        source: &ProviderIdentity,
        mut mapped: Record,
    ) -> AuthResult<Record> {
        let key = mapped
            .get(&source.identifier)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                AuthError::ProviderRejected(format!(
                    "Provider did not return {}",
                    source.identifier
                ))
            })?;

        let mut query = Record::new();
        query.insert(source.identifier.clone(), key);
        if let Some(existing) = db.find_one(&source.name, &query).await? {
            return Ok(existing);
        }

        let id = db.insert(&source.name, mapped.clone()).await?;
        mapped.entry("id").or_insert(id);
        tracing::debug!(entity = %source.name, "Created identity from provider claims");
        Ok(mapped)
    }

    /// Resolves the bearer token of `ctx`.
    ///
    /// Only storage failures are errors; every other problem demotes the
    /// request to anonymous.
    pub async fn verify(&self, ctx: &Context) -> AuthResult<Verdict> {
        let Some(token) = bearer_token(ctx) else {
            return Ok(Verdict::Anonymous(Demotion::MissingToken));
        };
        let Some((claims, _)) = verify_any(&token, self.config.strategies.secrets()) else {
            return Ok(Verdict::Anonymous(Demotion::UnverifiableToken));
        };

        let db = self.database(ctx)?;
        let Some(stored) = record::find_by_access_token(&*db, &token).await? else {
            return Ok(Verdict::Anonymous(Demotion::UnverifiableToken));
        };

        let now = self.clock.now();
        if !claims.is_expired(now) {
            return Ok(Verdict::Authenticated(claims.into_session(token)));
        }
        self.refresh_delegated(&*db, &token, claims, stored, now).await
    }

    fn delegated_provider(
        &self,
        stored: &AuthRecord,
        claims: &Claims,
    ) -> Option<(&str, &ProviderStrategy)> {
        let providers = &self.config.strategies.oauth;
        if let Some(client) = stored.client.as_deref() {
            return providers
                .get_key_value(client)
                .map(|(name, provider)| (name.as_str(), provider));
        }
        providers
            .iter()
            .find(|(_, provider)| {
                provider.entity.name == claims.entity
                    && claims
                        .identity()
                        .and_then(|identity| identity.get(&provider.entity.identifier))
                        .is_some()
            })
            .map(|(name, provider)| (name.as_str(), provider))
    }

    async fn refresh_delegated(
        &self,
        db: &dyn Database,
        token: &str,
        claims: Claims,
        stored: AuthRecord,
        now: i64,
    ) -> AuthResult<Verdict> {
        if stored.strategy == StrategyKind::Jwt {
            return Ok(Verdict::Anonymous(Demotion::ExpiredNoRefresh));
        }
        let Some((name, provider)) = self.delegated_provider(&stored, &claims) else {
            return Ok(Verdict::Anonymous(Demotion::ExpiredNoRefresh));
        };
        let Some(provider_refresh) = stored.refresh_token.clone() else {
            return Ok(Verdict::Anonymous(Demotion::ExpiredNoRefresh));
        };

        let renewed = match self.provider.refresh(name, provider, &provider_refresh).await {
            Ok(renewed) if renewed.access_token.is_some() => renewed,
            Ok(_) => {
                tracing::warn!(provider = name, "Provider refused to renew the token");
                return Ok(Verdict::Anonymous(Demotion::RefreshFailed));
            }
            Err(err) => {
                tracing::warn!(provider = name, error = %err, "Provider refresh failed");
                return Ok(Verdict::Anonymous(Demotion::RefreshFailed));
            }
        };

        let ttl = duration_or(provider.expires_in.as_deref(), DEFAULT_ACCESS_TTL)?;
        let claims = claims.renewed(now, ttl);
        let access_token = sign(&claims, &provider.client_secret)?;

        let updated = AuthRecord {
            access_token: access_token.clone(),
            refresh_token: renewed.refresh_token.or(stored.refresh_token.clone()),
            expires_at: expiry(now, ttl),
            ..stored
        };
        record::replace_by_access_token(db, token, &updated).await?;

        tracing::debug!(provider = name, entity = %claims.entity, "Token renewed through provider");
        Ok(Verdict::Refreshed(claims.into_session(access_token)))
    }
}

/// Stage that resolves the bearer token into the request session.
#[derive(Debug, Clone)]
pub struct AuthenticationStage {
    auth: Arc<Authenticator>,
}

impl AuthenticationStage {
    /// Creates the stage.
    pub fn new(auth: Arc<Authenticator>) -> Self {
        Self { auth }
    }
}

impl Stage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, QuickResult<()>> {
        Box::pin(async move {
            match self.auth.verify(ctx).await? {
                Verdict::Authenticated(session) => {
                    record_auth_outcome("authenticated");
                    ctx.set_session(session);
                }
                Verdict::Refreshed(session) => {
                    record_auth_outcome("refreshed");
                    ctx.set_session(session);
                }
                Verdict::Anonymous(reason) => {
                    record_auth_outcome(reason.as_str());
                    tracing::debug!(
                        request_id = %ctx.id(),
                        reason = reason.as_str(),
                        "Continuing without identity"
                    );
                }
            }
            Ok(())
        })
    }
}
