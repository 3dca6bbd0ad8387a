//! Built-in stages.

mod cors;
mod logging;

pub use cors::{AllowedOrigins, CorsConfig, CorsStage};
pub use logging::LoggingStage;
