//! Request execution.
//!
//! A [`Pipeline`] owns a server's middleware chain and runs one request
//! through it: chain, then the resolved handler (or a 404), all under the
//! [`TimeoutArbiter`]. Errors returned by a stage or the handler are turned
//! into exactly one error response here.

use crate::chain::{Flow, MiddlewareChain};
use crate::stage::Stage;
use crate::timeout::{transport_label, Outcome, TimeoutArbiter};
use quickserve_core::{Context, Handler, QuickError};

/// Message of the response written when no route matches.
pub const NOT_FOUND_MESSAGE: &str = "Not Found";

/// Runs requests through a middleware chain and their handler.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    chain: MiddlewareChain,
}

impl Pipeline {
    /// Creates a pipeline around `chain`.
    pub fn new(chain: MiddlewareChain) -> Self {
        Self { chain }
    }

    /// Appends a stage to the chain.
    pub fn add_stage(&mut self, stage: impl Stage) {
        self.chain.add_stage(stage);
    }

    /// Returns the chain.
    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Executes one request.
    ///
    /// `handler` is the route the router resolved, if any. The returned
    /// future resolves once the work finished or the deadline passed; by
    /// then the context has been finalized exactly once.
    pub async fn execute(&self, ctx: Context, handler: Option<Handler>) -> Outcome {
        let chain = self.chain.clone();
        let work_ctx = ctx.clone();
        let work = async move {
            match chain.run(&work_ctx).await {
                Ok(Flow::Continue) => match handler {
                    Some(handler) => {
                        if let Err(err) = handler(work_ctx.clone()).await {
                            work_ctx.error(err);
                        }
                    }
                    None => work_ctx.error(QuickError::not_found(NOT_FOUND_MESSAGE)),
                },
                Ok(Flow::Halt) => {}
                Err(err) => work_ctx.error(err),
            }
        };

        let outcome = TimeoutArbiter::arbitrate(&ctx, work).await;

        if let Some(status) = ctx.final_status() {
            quickserve_telemetry::metrics::record_request(
                transport_label(&ctx),
                status.as_u16(),
                ctx.elapsed(),
            );
            tracing::debug!(
                request_id = %ctx.id(),
                status = status.as_u16(),
                duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
                outcome = ?outcome,
                "Request finished"
            );
        }
        outcome
    }
}
