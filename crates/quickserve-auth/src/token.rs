//! Token signing and verification.
//!
//! Tokens are HS256 JWTs. Their payload is `{entity, <entity>: identity,
//! iat, exp}`. Signature checks never look at `exp`: expiry is judged
//! separately against a [`Clock`] so an expired token can still be
//! attributed to its identity and refreshed.

use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use quickserve_core::Session;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Source of the current time, in whole seconds.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Clock").field(&self.now()).finish()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl Clock {
    /// The wall clock.
    pub fn system() -> Self {
        Self(Arc::new(|| Utc::now().timestamp()))
    }

    /// A clock that reads `seconds`, for tests and replays.
    pub fn manual(seconds: Arc<AtomicI64>) -> Self {
        Self(Arc::new(move || seconds.load(Ordering::SeqCst)))
    }

    /// Returns the current Unix time in seconds.
    pub fn now(&self) -> i64 {
        (self.0)()
    }

    /// Returns the current time.
    pub fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.now(), 0).unwrap_or_default()
    }
}

/// Token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity type name.
    pub entity: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
    /// Unique token id, so two tokens issued in the same second differ.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jti: String,
    /// Remaining claims, including the identity under the entity name.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Claims {
    /// Claims for `identity` of type `entity`, valid for `ttl` from `now`.
    pub fn new(entity: impl Into<String>, identity: Value, now: i64, ttl: Duration) -> Self {
        let entity = entity.into();
        let mut payload = Map::new();
        payload.insert(entity.clone(), identity);
        Self {
            entity,
            iat: now,
            exp: now.saturating_add(lifetime_secs(ttl)),
            jti: Uuid::now_v7().to_string(),
            payload,
        }
    }

    /// Returns the embedded identity record.
    pub fn identity(&self) -> Option<&Value> {
        self.payload.get(&self.entity)
    }

    /// Returns `true` if the token is expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.exp <= now
    }

    /// Re-issues these claims with a fresh lifetime.
    pub fn renewed(&self, now: i64, ttl: Duration) -> Self {
        Self {
            entity: self.entity.clone(),
            iat: now,
            exp: now.saturating_add(lifetime_secs(ttl)),
            jti: Uuid::now_v7().to_string(),
            payload: self.payload.clone(),
        }
    }

    /// Builds the session these claims describe.
    pub fn into_session(self, token: String) -> Session {
        let mut claims = self.payload;
        claims.insert("iat".into(), self.iat.into());
        claims.insert("exp".into(), self.exp.into());
        Session {
            entity: Some(self.entity),
            token: Some(token),
            claims,
        }
    }
}

/// An issued access token and optional refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when refresh is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Signs `claims` with `secret`.
pub fn sign(claims: &Claims, secret: &str) -> AuthResult<String> {
    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Verifies the signature of `token` against `secret`, ignoring expiry.
pub fn verify_signature(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::new();

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .ok()
}

/// Tries every secret in order and returns the first successful decode.
pub fn verify_any<'a>(
    token: &str,
    secrets: impl IntoIterator<Item = &'a str>,
) -> Option<(Claims, &'a str)> {
    secrets
        .into_iter()
        .find_map(|secret| verify_signature(token, secret).map(|claims| (claims, secret)))
}

/// Issues an access token and, when `refresh_ttl` is set, a refresh token
/// for the same identity.
pub fn issue_pair(
    entity: &str,
    identity: Value,
    secret: &str,
    now: i64,
    access_ttl: Duration,
    refresh_ttl: Option<Duration>,
) -> AuthResult<TokenPair> {
    let access = Claims::new(entity, identity, now, access_ttl);
    let refresh_token = refresh_ttl
        .map(|ttl| sign(&access.renewed(now, ttl), secret))
        .transpose()?;
    Ok(TokenPair {
        access_token: sign(&access, secret)?,
        refresh_token,
    })
}

/// Parses a lifetime such as `"500ms"`, `"45s"`, `"30m"`, `"12h"`, `"10d"`,
/// `"2w"`, or plain seconds.
pub fn parse_duration(raw: &str) -> AuthResult<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| AuthError::InvalidConfig(format!("invalid duration '{raw}'")))?;
    let seconds = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        other => {
            return Err(AuthError::InvalidConfig(format!(
                "invalid duration unit '{other}' in '{raw}'"
            )))
        }
    };
    Ok(Duration::from_secs(value.saturating_mul(seconds)))
}

/// Parses an optional token lifetime, falling back to `default`.
///
/// Token timestamps have one-second resolution, so sub-second parts are
/// rounded up. A lifetime of zero is rejected.
pub fn duration_or(raw: Option<&str>, default: Duration) -> AuthResult<Duration> {
    let ttl = raw.map_or(Ok(default), parse_duration)?;
    if ttl.is_zero() {
        return Err(AuthError::InvalidConfig(format!(
            "token lifetime '{}' must be positive",
            raw.unwrap_or_default()
        )));
    }
    Ok(Duration::from_secs(lifetime_secs(ttl).unsigned_abs()))
}

/// Whole seconds covered by `ttl`, rounded up.
pub fn lifetime_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    i64::try_from(secs).unwrap_or(i64::MAX)
}
