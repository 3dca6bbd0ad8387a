//! CORS handling for HTTP servers.
//!
//! Adds `Access-Control-Allow-*` headers to every HTTP response whose
//! `Origin` is allowed and answers `OPTIONS` preflight requests with an
//! empty 204 before any other stage runs. Socket messages pass through
//! untouched.
//!
//! ```ignore
//! use quickserve_middleware::stages::{CorsConfig, CorsStage};
//!
//! let cors = CorsStage::new(
//!     CorsConfig::default().allow_origin("https://app.example.com"),
//! );
//! ```

use crate::stage::Stage;
use http::{Method, StatusCode};
use quickserve_core::{BoxFuture, Context, QuickResult, Transport};
use std::collections::HashSet;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// The set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin.
    Any,
    /// Only the listed origins.
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            headers: vec!["Content-Type".into(), "Authorization".into()],
        }
    }
}

impl CorsConfig {
    /// Restricts allowed origins to the given one, in addition to any
    /// previously listed.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.origins = match std::mem::replace(&mut self.origins, AllowedOrigins::Any) {
            AllowedOrigins::Any => AllowedOrigins::List(HashSet::from([origin])),
            AllowedOrigins::List(mut list) => {
                list.insert(origin);
                AllowedOrigins::List(list)
            }
        };
        self
    }

    /// Replaces the allowed methods.
    #[must_use]
    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Replaces the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the allowed origins.
    pub fn origins(&self) -> &AllowedOrigins {
        &self.origins
    }
}

/// Stage applying a [`CorsConfig`].
#[derive(Debug, Clone, Default)]
pub struct CorsStage {
    config: CorsConfig,
}

impl CorsStage {
    /// Creates the stage.
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    fn apply_headers(&self, ctx: &Context) -> bool {
        let origin = ctx.header(headers::ORIGIN);
        let allow_origin = match (&self.config.origins, origin) {
            (AllowedOrigins::Any, Some(origin)) => origin.to_string(),
            (AllowedOrigins::Any, None) => "*".to_string(),
            (origins, Some(origin)) if origins.is_allowed(origin) => origin.to_string(),
            _ => return false,
        };

        let methods: Vec<&str> = self.config.methods.iter().map(Method::as_str).collect();
        ctx.set_header(headers::ALLOW_ORIGIN, &allow_origin)
            .set_header(headers::ALLOW_METHODS, &methods.join(", "))
            .set_header(headers::ALLOW_HEADERS, &self.config.headers.join(", "))
            .set_header(headers::VARY, "Origin");
        true
    }
}

impl Stage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, QuickResult<()>> {
        Box::pin(async move {
            if ctx.transport() != Transport::Http {
                return Ok(());
            }
            let allowed = self.apply_headers(ctx);
            if ctx.method() == Some(&Method::OPTIONS) {
                let status = if allowed {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::FORBIDDEN
                };
                ctx.send_empty(status);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickserve_core::{ChannelResponder, Reply, RequestMeta};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn request(method: Method, origin: Option<&str>) -> (Context, UnboundedReceiver<Reply>) {
        let (responder, rx) = ChannelResponder::channel();
        let mut meta = RequestMeta::http(method, "/users");
        if let Some(origin) = origin {
            meta = meta.with_header("origin", origin);
        }
        (Context::builder(meta).build(responder), rx)
    }

    #[tokio::test]
    async fn test_preflight_answers_204() {
        let (ctx, mut rx) = request(Method::OPTIONS, Some("https://app.example.com"));
        CorsStage::default().run(&ctx).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        assert!(reply.body.is_empty());
        assert_eq!(
            reply.headers.get(headers::ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
        assert!(reply
            .headers
            .get(headers::ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("DELETE"));
    }

    #[tokio::test]
    async fn test_regular_request_continues_with_headers() {
        let (ctx, mut rx) = request(Method::GET, None);
        CorsStage::default().run(&ctx).await.unwrap();
        assert!(!ctx.is_finalized());

        ctx.send(serde_json::json!([])).unwrap();
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.headers.get(headers::ALLOW_ORIGIN).unwrap(), "*");
    }

    #[tokio::test]
    async fn test_disallowed_origin() {
        let stage = CorsStage::new(CorsConfig::default().allow_origin("https://ok.example"));
        let (ctx, mut rx) = request(Method::OPTIONS, Some("https://evil.example"));
        stage.run(&ctx).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert!(reply.headers.get(headers::ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_socket_passes_through() {
        let (responder, _rx) = ChannelResponder::channel();
        let ctx = Context::builder(RequestMeta::socket("list_users")).build(responder);
        CorsStage::default().run(&ctx).await.unwrap();
        assert!(!ctx.is_finalized());
    }
}
