//! # QuickServe
//!
//! **Declarative REST and WebSocket API server**
//!
//! QuickServe turns a configuration file into running API servers:
//!
//! - **Entities** become CRUD routes over HTTP and actions over sockets
//! - **Auth strategies** issue and verify signed tokens, shared-secret or
//!   delegated to an external provider
//! - **Permission rules** decide what every identity may do
//! - **One pipeline** runs CORS, logging, authentication, authorization and
//!   the handler, with a per-request deadline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quickserve::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     let config = ConfigLoader::new()
//!         .with_file("quickserve.toml")?
//!         .with_env_prefix("QUICKSERVE")
//!         .load()?;
//!
//!     let mut app = QuickServe::from_config(config)?;
//!     if let Some(api) = app.server_mut("api") {
//!         api.route(
//!             Method::GET,
//!             "/hello",
//!             handler(|ctx: Context| async move { ctx.send(serde_json::json!({"hello": "world"})) }),
//!         );
//!     }
//!     app.run().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/quickserve/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use futures_util::future::try_join_all;
use quickserve_config::QuickServeConfig;
use quickserve_server::{Server, ServerResult, ServerState, Services, ShutdownSignal};

// Re-export the member crates
pub use quickserve_auth as auth;
pub use quickserve_config as config;
pub use quickserve_core as core;
pub use quickserve_middleware as middleware;
pub use quickserve_router as router;
pub use quickserve_server as server;
pub use quickserve_telemetry as telemetry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::QuickServe;
    pub use http::Method;
    pub use quickserve_config::{ConfigLoader, QuickServeConfig};
    pub use quickserve_core::{handler, Context, Handler, QuickError, QuickResult};
    pub use quickserve_middleware::{stage_fn, Stage};
    pub use quickserve_server::{ServerError, ServerState, ShutdownSignal};
}

/// Every configured server of a process.
#[derive(Debug)]
pub struct QuickServe {
    services: Services,
    servers: Vec<ServerState>,
}

impl QuickServe {
    /// Validates `config` and assembles every server.
    pub fn from_config(config: QuickServeConfig) -> ServerResult<Self> {
        config.validate()?;
        let services = Services::from_config(&config)?;
        let servers = config
            .servers
            .iter()
            .map(|server| ServerState::new(server.clone(), &services))
            .collect::<ServerResult<Vec<_>>>()?;
        Ok(Self { services, servers })
    }

    /// Returns the shared collaborators.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Returns every server.
    pub fn servers(&self) -> &[ServerState] {
        &self.servers
    }

    /// Returns the server named `name` for adding routes or stages.
    pub fn server_mut(&mut self, name: &str) -> Option<&mut ServerState> {
        self.servers.iter_mut().find(|server| server.name() == name)
    }

    /// Runs every server until SIGTERM or SIGINT.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Runs every server until `shutdown` fires.
    ///
    /// All addresses are bound before any server starts accepting, so a
    /// port conflict fails the whole process up front.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let mut bound = Vec::with_capacity(self.servers.len());
        for state in self.servers {
            bound.push(Server::bind(Arc::new(state)).await?);
        }
        tracing::info!(servers = bound.len(), version = VERSION, "QuickServe started");

        let result = try_join_all(bound.into_iter().map(|server| server.run(shutdown.clone()))).await;
        // One failing server takes the others down with it.
        shutdown.trigger();
        result.map(|_| ())
    }
}
