//! Request logging.

use crate::stage::Stage;
use quickserve_core::{BoxFuture, Context, QuickResult};

/// Logs every request as it enters the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStage;

impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, QuickResult<()>> {
        Box::pin(async move {
            let info = ctx.info();
            tracing::info!(
                request_id = %info.id,
                server = %info.server,
                method = info.method.as_deref().unwrap_or("-"),
                url = %info.url,
                "Incoming request"
            );
            if tracing::enabled!(tracing::Level::DEBUG) {
                let snapshot = serde_json::to_string(&info).unwrap_or_default();
                tracing::debug!(request_id = %info.id, info = %snapshot, "Request snapshot");
            }
            Ok(())
        })
    }
}
