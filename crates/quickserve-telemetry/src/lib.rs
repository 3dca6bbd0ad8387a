//! Logging and metrics for QuickServe.
//!
//! - **Logging**: `tracing-subscriber` with JSON or pretty output
//! - **Metrics**: request, timeout, and security counters through the
//!   `metrics` facade, optionally exported in Prometheus format
//!
//! # Example
//!
//! ```rust,ignore
//! use quickserve_telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::default())?;
//! ```

#![doc(html_root_url = "https://docs.rs/quickserve-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use crate::logging::{init_logging, LogConfig};
pub use crate::metrics::{init_metrics, MetricsConfig};

use serde::Deserialize;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Combined telemetry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Logging settings.
    pub logging: LogConfig,
    /// Metrics settings.
    pub metrics: MetricsConfig,
}

/// Initializes logging, then metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::debug!(
        json = config.logging.json,
        metrics = config.metrics.enabled,
        "Telemetry initialized"
    );
    Ok(())
}
