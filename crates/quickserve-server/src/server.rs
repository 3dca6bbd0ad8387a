//! Transport selection.

use std::net::SocketAddr;
use std::sync::Arc;

use quickserve_config::ServerKind;

use crate::error::ServerResult;
use crate::rest::HttpServer;
use crate::shutdown::ShutdownSignal;
use crate::socket::SocketServer;
use crate::state::ServerState;

/// A bound server of either transport.
///
/// `rest` and `file` servers speak HTTP, `socket` servers speak WebSocket.
#[derive(Debug)]
pub enum Server {
    /// HTTP transport.
    Http(HttpServer),
    /// WebSocket transport.
    Socket(SocketServer),
}

impl Server {
    /// Binds the configured address with the transport of the server's kind.
    pub async fn bind(state: Arc<ServerState>) -> ServerResult<Self> {
        let addr = state.config().addr();
        Self::bind_to(state, &addr).await
    }

    /// Binds an explicit address with the transport of the server's kind.
    pub async fn bind_to(state: Arc<ServerState>, addr: &str) -> ServerResult<Self> {
        match state.config().kind {
            ServerKind::Rest | ServerKind::File => {
                Ok(Self::Http(HttpServer::bind_to(state, addr).await?))
            }
            ServerKind::Socket => Ok(Self::Socket(SocketServer::bind_to(state, addr).await?)),
        }
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        match self {
            Self::Http(server) => server.local_addr(),
            Self::Socket(server) => server.local_addr(),
        }
    }

    /// Serves until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        match self {
            Self::Http(server) => server.run(shutdown).await,
            Self::Socket(server) => server.run(shutdown).await,
        }
    }
}
