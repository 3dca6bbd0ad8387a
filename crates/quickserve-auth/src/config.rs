//! Auth configuration.
//!
//! Loaded once at startup and read-only afterwards. Field names follow the
//! camelCase keys used in configuration files:
//!
//! ```toml
//! [auth.strategies.jwt]
//! secret = "change-me"
//! expiresIn = "12h"
//! refreshToken = { enabled = true, expiration = "10d" }
//! entity = { name = "users", identifiers = ["email", "password"] }
//!
//! [auth.strategies.oauth.google]
//! clientId = "..."
//! clientSecret = "..."
//! authUrl = "https://accounts.google.com/o/oauth2/v2/auth"
//! tokenUrl = "https://oauth2.googleapis.com/token"
//! userInfoUrl = "https://www.googleapis.com/oauth2/v2/userinfo"
//! entity = { name = "users", identifier = "email", mapper = { email = "email", name = "name" } }
//!
//! [auth.permissions]
//! whitelist = ["/public/*"]
//! default = { "*" = { get = true, list = true } }
//! ```

use crate::error::{AuthError, AuthResult};
use crate::token::{duration_or, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL};
use http::Method;
use indexmap::IndexMap;
use serde::Deserialize;

/// Scope requested from providers when none is configured.
pub const DEFAULT_SCOPE: &str = "email profile";

/// The wildcard role.
pub const ANY_ROLE: &str = "*";

/// Complete auth configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Token strategies.
    pub strategies: Strategies,
    /// Permission rules.
    pub permissions: PermissionsConfig,
}

impl AuthConfig {
    /// Checks that every configured strategy is complete.
    pub fn validate(&self) -> AuthResult<()> {
        if let Some(jwt) = &self.strategies.jwt {
            if jwt.secret.is_empty() {
                return Err(AuthError::InvalidConfig("jwt secret must not be empty".into()));
            }
            if jwt.entity.identifiers.is_empty() {
                return Err(AuthError::InvalidConfig(
                    "jwt entity needs at least one identifier".into(),
                ));
            }
            duration_or(jwt.expires_in.as_deref(), DEFAULT_ACCESS_TTL)?;
            duration_or(jwt.refresh_token.expiration.as_deref(), DEFAULT_REFRESH_TTL)?;
        }
        for (name, provider) in &self.strategies.oauth {
            for (field, value) in [
                ("clientId", &provider.client_id),
                ("clientSecret", &provider.client_secret),
                ("authUrl", &provider.auth_url),
                ("tokenUrl", &provider.token_url),
                ("userInfoUrl", &provider.user_info_url),
            ] {
                if value.is_empty() {
                    return Err(AuthError::InvalidConfig(format!(
                        "oauth provider '{name}' is missing {field}"
                    )));
                }
            }
            duration_or(provider.expires_in.as_deref(), DEFAULT_ACCESS_TTL)?;
        }
        Ok(())
    }

    /// Returns `true` if any strategy is configured.
    pub fn has_strategies(&self) -> bool {
        self.strategies.jwt.is_some() || !self.strategies.oauth.is_empty()
    }
}

/// Configured token strategies.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Strategies {
    /// The shared-secret strategy.
    pub jwt: Option<SharedSecretStrategy>,
    /// Delegated providers keyed by name, in declaration order.
    pub oauth: IndexMap<String, ProviderStrategy>,
}

impl Strategies {
    /// Returns every signing secret in trial order: the shared secret first,
    /// then each provider's client secret in declaration order.
    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        self.jwt
            .iter()
            .map(|jwt| jwt.secret.as_str())
            .chain(self.oauth.values().map(|p| p.client_secret.as_str()))
    }

    /// Returns the provider named `name`.
    pub fn provider(&self, name: &str) -> Option<&ProviderStrategy> {
        self.oauth.get(name)
    }
}

/// Shared-secret strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SharedSecretStrategy {
    /// Signing secret.
    pub secret: String,
    /// Access token lifetime, e.g. `"12h"`.
    #[serde(default)]
    pub expires_in: Option<String>,
    /// Refresh token policy.
    #[serde(default)]
    pub refresh_token: RefreshPolicy,
    /// Identity lookup.
    pub entity: CredentialSource,
}

/// Where shared-secret logins look identities up.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialSource {
    /// Entity (table) name.
    pub name: String,
    /// Body fields that must all match one record.
    pub identifiers: Vec<String>,
}

/// Refresh token policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshPolicy {
    /// Whether refresh tokens are issued.
    pub enabled: bool,
    /// Refresh token lifetime, e.g. `"10d"`.
    pub expiration: Option<String>,
}

/// Delegated authorization-code provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderStrategy {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret, also used to sign local tokens.
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// User info endpoint.
    pub user_info_url: String,
    /// Requested scope.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Access token lifetime of locally issued tokens.
    #[serde(default)]
    pub expires_in: Option<String>,
    /// Identity mapping.
    pub entity: ProviderIdentity,
    /// Refresh token policy.
    #[serde(default)]
    pub refresh_token: RefreshPolicy,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

/// How provider user info becomes a local identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderIdentity {
    /// Entity (table) name.
    pub name: String,
    /// Local field that uniquely identifies the identity.
    pub identifier: String,
    /// Provider claim name to local field name. Empty keeps every claim.
    #[serde(default)]
    pub mapper: IndexMap<String, String>,
}

/// An action a request can perform on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read one record.
    Get,
    /// Read many records.
    List,
    /// Create records.
    Insert,
    /// Modify records.
    Update,
    /// Remove records.
    Delete,
    /// Full-text search.
    Search,
}

impl Action {
    /// Returns the actions implied by an HTTP method.
    pub fn for_method(method: &Method) -> &'static [Self] {
        match *method {
            Method::GET => &[Self::Get, Self::List, Self::Search],
            Method::POST => &[Self::Insert],
            Method::PUT | Method::PATCH => &[Self::Update],
            Method::DELETE => &[Self::Delete],
            _ => &[],
        }
    }
}

/// Which actions a role may perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionSet {
    /// May read one record.
    pub get: bool,
    /// May read many records.
    pub list: bool,
    /// May create records.
    pub insert: bool,
    /// May modify records.
    pub update: bool,
    /// May remove records.
    pub delete: bool,
    /// May search.
    pub search: bool,
}

impl ActionSet {
    /// Every action allowed.
    pub const fn all() -> Self {
        Self {
            get: true,
            list: true,
            insert: true,
            update: true,
            delete: true,
            search: true,
        }
    }

    /// Returns whether `action` is allowed.
    pub const fn allows(&self, action: Action) -> bool {
        match action {
            Action::Get => self.get,
            Action::List => self.list,
            Action::Insert => self.insert,
            Action::Update => self.update,
            Action::Delete => self.delete,
            Action::Search => self.search,
        }
    }

    /// Returns whether any of `actions` is allowed.
    pub fn allows_any(&self, actions: &[Action]) -> bool {
        actions.iter().any(|a| self.allows(*a))
    }
}

/// Role name to allowed actions.
pub type PermissionSet = IndexMap<String, ActionSet>;

/// Permission rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsConfig {
    /// Paths or actions that skip authorization. `*` matches anything.
    pub whitelist: Vec<String>,
    /// Rules that apply regardless of identity.
    pub default: PermissionSet,
    /// Rules per identity type.
    pub entities: IndexMap<String, PermissionSet>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            default: IndexMap::from([(ANY_ROLE.to_string(), ActionSet::all())]),
            entities: IndexMap::new(),
        }
    }
}
