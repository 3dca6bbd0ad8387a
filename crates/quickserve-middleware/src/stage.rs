//! The stage trait.
//!
//! A [`Stage`] is one cross-cutting step that runs before the route handler:
//! logging, authentication, authorization, or any user middleware. Stages
//! work against the shared [`Context`] and either let the request continue
//! (return `Ok(())` without finalizing), answer it themselves (finalize the
//! context), or fail (return an error, which the chain turns into a single
//! error response).
//!
//! # Example
//!
//! ```
//! use quickserve_core::{Context, QuickError};
//! use quickserve_middleware::stage_fn;
//!
//! let api_key = stage_fn("api-key", |ctx: Context| async move {
//!     if ctx.header("x-api-key").is_none() {
//!         return Err(QuickError::unauthenticated("Missing API key"));
//!     }
//!     Ok(())
//! });
//! ```

use quickserve_core::{BoxFuture, Context, QuickResult};
use std::future::Future;
use std::sync::Arc;

/// One step of the middleware chain.
pub trait Stage: Send + Sync + 'static {
    /// Returns the name of this stage, used in logs.
    fn name(&self) -> &'static str;

    /// Runs the stage against `ctx`.
    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, QuickResult<()>>;
}

/// A shared, type-erased stage.
pub type BoxedStage = Arc<dyn Stage>;

/// A stage built from an async closure.
pub struct FnStage<F> {
    name: &'static str,
    f: F,
}

impl<F> std::fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

/// Wraps an async closure over a [`Context`] as a [`Stage`].
pub fn stage_fn<F, Fut>(name: &'static str, f: F) -> FnStage<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QuickResult<()>> + Send + 'static,
{
    FnStage { name, f }
}

impl<F, Fut> Stage for FnStage<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QuickResult<()>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, QuickResult<()>> {
        Box::pin((self.f)(ctx.clone()))
    }
}
