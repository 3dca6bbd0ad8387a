//! Transports for QuickServe.
//!
//! This crate turns a configured server into a running one:
//!
//! - [`Services`] builds the shared collaborators: databases, entities and
//!   the auth engines.
//! - [`ServerState`] assembles one server's middleware pipeline, its HTTP
//!   router and its socket action router, including the generated CRUD,
//!   search and auth routes.
//! - [`HttpServer`] and [`SocketServer`] accept connections and feed each
//!   request through the pipeline; [`Server`] picks one by server kind.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quickserve_config::QuickServeConfig;
//! use quickserve_server::{Server, ServerState, Services, ShutdownSignal};
//!
//! # async fn run() -> Result<(), quickserve_server::ServerError> {
//! let config = QuickServeConfig::default();
//! let services = Services::from_config(&config)?;
//! let state = Arc::new(ServerState::new(config.servers[0].clone(), &services)?);
//! Server::bind(state).await?.run(ShutdownSignal::with_os_signals()).await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/quickserve-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod crud;
mod error;
pub mod factory;
pub mod rest;
pub mod search;
mod server;
mod shutdown;
pub mod socket;
mod state;

pub use error::{ServerError, ServerResult};
pub use rest::HttpServer;
pub use server::Server;
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
pub use socket::SocketServer;
pub use state::{ServerState, Services};
