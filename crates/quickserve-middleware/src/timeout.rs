//! Timeout arbitration.
//!
//! The [`TimeoutArbiter`] races a request's work against the deadline carried
//! by its [`Context`]. The work runs on its own task and is never cancelled:
//! if the deadline wins, the arbiter writes a single 408 and any later
//! `send` from the work is suppressed by the context's finalize guard. If the
//! work already answered, the deadline outcome is discarded.

use quickserve_core::{Context, QuickError};
use std::future::Future;
use tokio::task::JoinError;

/// Message of the response written when the deadline wins.
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

/// Message of the response written when the work never answers.
pub const UNANSWERED_MESSAGE: &str = "Handler completed without sending a response";

/// How a request's work ended from the arbiter's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The work answered the request.
    Completed,
    /// The deadline passed first; the arbiter answered with 408.
    TimedOut,
    /// The work panicked; the arbiter answered with 500.
    Panicked,
    /// The work finished without answering; the arbiter answered with 500.
    Unanswered,
}

/// Races request work against the request deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutArbiter;

impl TimeoutArbiter {
    /// Spawns `work` and waits for it or the deadline, whichever comes first.
    ///
    /// Guarantees the context is finalized when this returns unless the
    /// deadline is unbounded and the work never ends.
    pub async fn arbitrate<F>(ctx: &Context, work: F) -> Outcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut task = tokio::spawn(work);

        tokio::select! {
            biased;
            joined = &mut task => Self::settle(ctx, joined),
            () = ctx.deadline().expired() => Self::expire(ctx),
        }
    }

    fn settle(ctx: &Context, joined: Result<(), JoinError>) -> Outcome {
        match joined {
            Ok(()) if ctx.is_finalized() => Outcome::Completed,
            Ok(()) if ctx.deadline().is_expired() => Self::expire(ctx),
            Ok(()) => {
                tracing::warn!(request_id = %ctx.id(), url = ctx.url(), "{UNANSWERED_MESSAGE}");
                ctx.error(QuickError::internal(UNANSWERED_MESSAGE));
                Outcome::Unanswered
            }
            Err(err) => {
                let panicked = err.is_panic();
                ctx.error(QuickError::internal_with_source(
                    "Request handler failed",
                    std::io::Error::other(err.to_string()),
                ));
                if panicked {
                    Outcome::Panicked
                } else {
                    Outcome::Unanswered
                }
            }
        }
    }

    fn expire(ctx: &Context) -> Outcome {
        ctx.deadline().fire();
        if ctx.is_finalized() {
            return Outcome::Completed;
        }
        tracing::warn!(
            request_id = %ctx.id(),
            url = ctx.url(),
            elapsed_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request timed out"
        );
        quickserve_telemetry::metrics::record_timeout(transport_label(ctx));
        ctx.error(QuickError::timeout(TIMEOUT_MESSAGE));
        Outcome::TimedOut
    }
}

pub(crate) fn transport_label(ctx: &Context) -> &'static str {
    match ctx.transport() {
        quickserve_core::Transport::Http => "http",
        quickserve_core::Transport::Socket => "socket",
    }
}
