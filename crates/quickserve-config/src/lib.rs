//! Typed configuration for QuickServe.
//!
//! A [`QuickServeConfig`] declares everything a QuickServe process runs:
//!
//! - [`ServerConfig`] - REST, socket, and file servers
//! - [`DatabaseConfig`] - named database bindings
//! - entities - field declarations shared by every server
//! - auth - token strategies and permission rules
//! - telemetry - logging and metrics
//!
//! # Example
//!
//! ```no_run
//! use quickserve_config::ConfigLoader;
//!
//! # fn main() -> Result<(), quickserve_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("quickserve.toml")?
//!     .with_env_prefix("QUICKSERVE")
//!     .load()?;
//!
//! for server in &config.servers {
//!     println!("{} listens on {}", server.name, server.addr());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [[servers]]
//! name = "api"
//! type = "rest"
//! port = 8080
//! database = "main"
//! request = { limit = 10, timeout = "60s" }
//!
//! [[databases]]
//! name = "main"
//! type = "in-memory"
//!
//! [[entities]]
//! name = "users"
//! fields = { email = { type = "string", required = true }, password = { type = "string", secure = true } }
//!
//! [auth.strategies.jwt]
//! secret = "change-me"
//! expiresIn = "12h"
//! refreshToken = { enabled = true, expiration = "10d" }
//! entity = { name = "users", identifiers = ["email", "password"] }
//!
//! [auth.permissions]
//! whitelist = ["/health"]
//!
//! [telemetry.logging]
//! level = "info"
//! json = true
//! ```

#![doc(html_root_url = "https://docs.rs/quickserve-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::QuickServeConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{DatabaseConfig, DatabaseKind, RequestLimits, ServerConfig, ServerKind};
