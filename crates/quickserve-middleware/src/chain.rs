//! The ordered middleware chain.
//!
//! Stages run strictly in registration order, each awaited before the next.
//! Before every stage the chain checks whether the response was already
//! written or the request deadline passed; either way the remaining stages
//! are skipped silently. The first stage error stops the chain and is handed
//! back to the caller, which turns it into the one error response.
//!
//! ```text
//! ┌─────────┐   ┌────────────────┐   ┌───────────────┐   ┌──────┐   ┌─────────┐
//! │ logging │──►│ authentication │──►│ authorization │──►│ user │──►│ handler │
//! └─────────┘   └────────────────┘   └───────────────┘   └──────┘   └─────────┘
//! ```

use crate::stage::{BoxedStage, Stage};
use quickserve_core::{Context, QuickResult};
use std::sync::Arc;

/// Whether the request should continue to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Every stage ran and nothing answered the request.
    Continue,
    /// A stage answered the request or the deadline passed.
    Halt,
}

/// An ordered list of stages.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<BoxedStage>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl MiddlewareChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a chain.
    pub fn builder() -> MiddlewareChainBuilder {
        MiddlewareChainBuilder::default()
    }

    /// Appends a stage.
    pub fn add_stage(&mut self, stage: impl Stage) {
        self.stages.push(Arc::new(stage));
    }

    /// Appends an already shared stage.
    pub fn add_shared(&mut self, stage: BoxedStage) {
        self.stages.push(stage);
    }

    /// Returns the stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order.
    ///
    /// Returns [`Flow::Halt`] as soon as the context is finalized or the
    /// deadline passes, and the first stage error otherwise.
    pub async fn run(&self, ctx: &Context) -> QuickResult<Flow> {
        for stage in &self.stages {
            if should_halt(ctx) {
                tracing::trace!(request_id = %ctx.id(), stage = stage.name(), "Skipping stage");
                return Ok(Flow::Halt);
            }
            if let Err(err) = stage.run(ctx).await {
                tracing::debug!(
                    request_id = %ctx.id(),
                    stage = stage.name(),
                    error = %err,
                    "Stage failed"
                );
                return Err(err);
            }
        }

        if should_halt(ctx) {
            Ok(Flow::Halt)
        } else {
            Ok(Flow::Continue)
        }
    }
}

fn should_halt(ctx: &Context) -> bool {
    ctx.is_finalized() || ctx.deadline().is_expired()
}

/// Builder for [`MiddlewareChain`].
#[derive(Default)]
pub struct MiddlewareChainBuilder {
    stages: Vec<BoxedStage>,
}

impl MiddlewareChainBuilder {
    /// Appends a stage.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends a stage only when `enabled`.
    pub fn stage_if(self, enabled: bool, stage: impl Stage) -> Self {
        if enabled {
            self.stage(stage)
        } else {
            self
        }
    }

    /// Builds the chain.
    pub fn build(self) -> MiddlewareChain {
        MiddlewareChain {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_fn;
    use quickserve_core::{ChannelResponder, Context, QuickError, RequestMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx() -> Context {
        let (responder, _rx) = ChannelResponder::channel();
        Context::builder(RequestMeta::http(http::Method::GET, "/x")).build(responder)
    }

    fn counting(name: &'static str, hits: Arc<AtomicUsize>) -> impl Stage {
        stage_fn(name, move |_ctx: Context| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let order = Arc::new(order::Order::default());
        let chain = MiddlewareChain::builder()
            .stage(order.push("a"))
            .stage(order.push("b"))
            .stage(order.push("c"))
            .build();

        assert_eq!(chain.stage_names(), vec!["a", "b", "c"]);
        assert_eq!(chain.run(&ctx()).await.unwrap(), Flow::Continue);
        assert_eq!(order.seen(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_finalizing_stage_skips_rest() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .stage(stage_fn("answer", |ctx: Context| async move {
                ctx.send(serde_json::json!({"early": true}))
            }))
            .stage(counting("after", hits.clone()))
            .build();

        assert_eq!(chain.run(&ctx()).await.unwrap(), Flow::Halt);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_stops_chain() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .stage(stage_fn("fail", |_ctx: Context| async move {
                Err(QuickError::forbidden("Forbidden"))
            }))
            .stage(counting("after", hits.clone()))
            .build();

        let err = chain.run(&ctx()).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::FORBIDDEN);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_halts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .stage(stage_fn("slow", |_ctx: Context| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }))
            .stage(counting("after", hits.clone()))
            .build();

        let (responder, _rx) = ChannelResponder::channel();
        let ctx = Context::builder(RequestMeta::socket("list_users"))
            .timeout(Duration::from_millis(10))
            .build(responder);

        assert_eq!(chain.run(&ctx).await.unwrap(), Flow::Halt);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stage_if() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .stage_if(false, counting("off", hits.clone()))
            .stage_if(true, counting("on", hits))
            .build();
        assert_eq!(chain.stage_names(), vec!["on"]);
    }

    mod order {
        use super::*;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct Order(Mutex<Vec<&'static str>>);

        impl Order {
            pub fn push(self: &Arc<Self>, name: &'static str) -> impl Stage {
                let order = self.clone();
                stage_fn(name, move |_ctx: Context| {
                    let order = order.clone();
                    async move {
                        order.0.lock().unwrap().push(name);
                        Ok(())
                    }
                })
            }

            pub fn seen(&self) -> Vec<&'static str> {
                self.0.lock().unwrap().clone()
            }
        }
    }
}
