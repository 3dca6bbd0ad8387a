//! Authentication and authorization for QuickServe.
//!
//! Two strategies issue access tokens:
//!
//! - **Shared secret** (`jwt`): identifiers in the login body are looked up in
//!   the identity table and a signed token pair is returned.
//! - **Delegated** (`oauth`): an authorization code is exchanged with a
//!   provider, the provider's user is upserted locally, and a token pair
//!   signed with the provider's client secret is returned.
//!
//! Every issued pair is recorded in the `auth` table. On each request the
//! [`AuthenticationStage`] verifies the bearer token against every configured
//! secret and renews expired delegated tokens through their provider. The
//! [`AuthorizationStage`] then applies the permission rules.
//!
//! # Example
//!
//! ```ignore
//! use quickserve_auth::{AuthenticationStage, Authenticator, AuthorizationStage, Authorizer};
//!
//! let auth = Arc::new(Authenticator::new(config.clone(), databases, entities));
//! let authz = Arc::new(Authorizer::new(config.permissions.clone())?);
//! let chain = MiddlewareChain::builder()
//!     .stage(AuthenticationStage::new(auth.clone()))
//!     .stage(AuthorizationStage::new(authz, ServerPolicy::default()))
//!     .build();
//! ```

#![doc(html_root_url = "https://docs.rs/quickserve-auth/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod authentication;
mod authorization;
pub mod config;
mod error;
pub mod provider;
pub mod record;
pub mod routes;
pub mod token;

pub use authentication::{
    bearer_token, callback_uri, AuthenticationStage, Authenticator, Demotion, Verdict,
};
pub use authorization::{
    method_for_action, AccessRequest, AuthorizationStage, Authorizer, Decision, Grant,
    ServerPolicy, FORBIDDEN_MESSAGE, SYSTEM_ACTION_PREFIX, SYSTEM_PATH_PREFIX,
};
pub use config::{AuthConfig, PermissionsConfig, Strategies};
pub use error::{AuthError, AuthResult};
pub use provider::{HttpProviderClient, ProviderClient, ProviderTokens};
pub use token::{Claims, Clock, TokenPair};
