//! Request and security metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `quickserve_requests_total` | Counter | `transport`, `status` |
//! | `quickserve_request_duration_seconds` | Histogram | `transport` |
//! | `quickserve_timeouts_total` | Counter | `transport` |
//! | `quickserve_auth_outcomes_total` | Counter | `outcome` |
//! | `quickserve_authz_decisions_total` | Counter | `allowed`, `reason` |
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use crate::error::TelemetryError;
use crate::TelemetryResult;
use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to expose a Prometheus endpoint.
    pub enabled: bool,
    /// Listen address of the endpoint.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and its HTTP listener.
///
/// # Errors
///
/// Returns an error if the address is invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    describe_counter!("quickserve_requests_total", "Requests answered, by status");
    describe_histogram!(
        "quickserve_request_duration_seconds",
        "Time from context creation to the final response"
    );
    describe_counter!("quickserve_timeouts_total", "Requests answered by the timeout arbiter");
    describe_counter!("quickserve_auth_outcomes_total", "Bearer verification outcomes");
    describe_counter!("quickserve_authz_decisions_total", "Authorization decisions");
    Ok(())
}

/// Records a finalized request.
pub fn record_request(transport: &'static str, status: u16, duration: Duration) {
    counter!(
        "quickserve_requests_total",
        "transport" => transport,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("quickserve_request_duration_seconds", "transport" => transport)
        .record(duration.as_secs_f64());
}

/// Records a request answered by the timeout arbiter.
pub fn record_timeout(transport: &'static str) {
    counter!("quickserve_timeouts_total", "transport" => transport).increment(1);
}

/// Records the outcome of bearer verification.
pub fn record_auth_outcome(outcome: &'static str) {
    counter!("quickserve_auth_outcomes_total", "outcome" => outcome).increment(1);
}

/// Records an authorization decision.
pub fn record_authz_decision(allowed: bool, reason: &'static str) {
    counter!(
        "quickserve_authz_decisions_total",
        "allowed" => if allowed { "true" } else { "false" },
        "reason" => reason
    )
    .increment(1);
}
