//! Route handlers.
//!
//! A [`Handler`] is a type-erased async function over a [`Context`]. Handlers
//! finalize the response through the context and report failures by
//! returning an error, which the middleware chain turns into a single error
//! response.

use crate::{Context, QuickResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased route handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<'static, QuickResult<()>> + Send + Sync>;

/// Wraps an async function as a [`Handler`].
///
/// # Example
///
/// ```
/// use quickserve_core::{handler, Context, Handler};
///
/// let ping: Handler = handler(|ctx: Context| async move {
///     ctx.send(serde_json::json!({"pong": true}))
/// });
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QuickResult<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelResponder, QuickError, RequestMeta};
    use http::Method;

    #[tokio::test]
    async fn test_handler_runs_against_context() {
        let h = handler(|ctx: Context| async move {
            let id = ctx
                .param_str("id")
                .ok_or_else(|| QuickError::bad_request("id required"))?;
            ctx.send(serde_json::json!({ "id": id }))
        });

        let (responder, mut rx) = ChannelResponder::channel();
        let mut params = crate::Params::new();
        params.insert("id".into(), "42".into());
        let ctx = Context::builder(RequestMeta::http(Method::GET, "/x/42").with_params(params))
            .build(responder);

        h(ctx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().text(), r#"{"id":"42"}"#);
    }

    #[tokio::test]
    async fn test_handler_error_is_returned() {
        let h = handler(|_ctx: Context| async move { Err(QuickError::bad_request("nope")) });
        let (responder, _rx) = ChannelResponder::channel();
        let ctx = Context::builder(RequestMeta::socket("noop")).build(responder);
        assert!(h(ctx).await.is_err());
    }
}
