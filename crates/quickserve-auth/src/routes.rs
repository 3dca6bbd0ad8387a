//! Authentication system routes.
//!
//! Shared-secret routes are registered only when the `jwt` strategy is
//! configured; delegated routes only when at least one provider is.

use crate::authentication::Authenticator;
use crate::error::AuthResult;
use quickserve_core::{handler, Context, Handler};
use quickserve_router::{ActionRouter, Router};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// HTTP path of the shared-secret login.
pub const LOGIN_PATH: &str = "/system/auth";
/// HTTP path of the shared-secret refresh.
pub const REFRESH_PATH: &str = "/system/auth/refresh";
/// HTTP path of the delegated authorization redirect.
pub const OAUTH_AUTHORIZE_PATH: &str = "/system/oauth/:client";
/// HTTP path of the delegated code exchange.
pub const OAUTH_CALLBACK_PATH: &str = "/system/oauth/callback/:client";

/// Socket action of the shared-secret login.
pub const LOGIN_ACTION: &str = "system_auth_jwt";
/// Socket action of the shared-secret refresh.
pub const REFRESH_ACTION: &str = "system_auth_jwt_refresh";
/// Socket action of the delegated authorization redirect.
pub const OAUTH_AUTHORIZE_ACTION: &str = "system_oauth_authenticate";
/// Socket action of the delegated code exchange.
pub const OAUTH_CALLBACK_ACTION: &str = "system_oauth_callback";

fn endpoint<F, Fut>(auth: &Arc<Authenticator>, op: F) -> Handler
where
    F: Fn(Arc<Authenticator>, Context) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = AuthResult<Value>> + Send + 'static,
{
    let auth = Arc::clone(auth);
    handler(move |ctx: Context| {
        let auth = Arc::clone(&auth);
        async move {
            let body = op(auth, ctx.clone()).await?;
            ctx.send(body)
        }
    })
}

fn endpoints(auth: &Arc<Authenticator>) -> Vec<(&'static str, &'static str, Handler)> {
    let strategies = &auth.config().strategies;
    let mut out = Vec::new();
    if strategies.jwt.is_some() {
        out.push((
            REFRESH_PATH,
            REFRESH_ACTION,
            endpoint(auth, |auth, ctx| async move { auth.refresh(&ctx).await }),
        ));
        out.push((
            LOGIN_PATH,
            LOGIN_ACTION,
            endpoint(auth, |auth, ctx| async move { auth.login(&ctx).await }),
        ));
    }
    if !strategies.oauth.is_empty() {
        out.push((
            OAUTH_CALLBACK_PATH,
            OAUTH_CALLBACK_ACTION,
            endpoint(auth, |auth, ctx| async move { auth.callback(&ctx).await }),
        ));
        out.push((
            OAUTH_AUTHORIZE_PATH,
            OAUTH_AUTHORIZE_ACTION,
            endpoint(auth, |auth, ctx| async move { auth.authorize_url(&ctx) }),
        ));
    }
    out
}

/// Registers the authentication routes on an HTTP router.
pub fn register_http(router: &mut Router<Handler>, auth: &Arc<Authenticator>) {
    for (path, _, handler) in endpoints(auth) {
        if path.starts_with("/system/oauth") {
            router.get(path, handler);
        } else {
            router.post(path, handler);
        }
    }
}

/// Registers the authentication actions on a socket router.
pub fn register_socket(router: &mut ActionRouter<Handler>, auth: &Arc<Authenticator>) {
    for (_, action, handler) in endpoints(auth) {
        router.action(action, handler);
    }
}
