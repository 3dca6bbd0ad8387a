//! WebSocket transport.
//!
//! Every text frame is a JSON envelope `{action, params, body}`. Actions
//! are resolved against the server's action router and run through the same
//! pipeline as HTTP requests. Replies of every message of a connection share
//! one writer task, so a slow handler never blocks later messages.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use http::HeaderMap;
use quickserve_core::{ChannelResponder, RequestMeta};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::factory::{self, Envelope, Rejection};
use crate::rest::SHUTDOWN_GRACE;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::state::ServerState;

/// A socket server bound to its address.
#[derive(Debug)]
pub struct SocketServer {
    state: Arc<ServerState>,
    listener: TcpListener,
}

impl SocketServer {
    /// Binds the server's configured address.
    pub async fn bind(state: Arc<ServerState>) -> ServerResult<Self> {
        let addr = state.config().addr();
        Self::bind_to(state, &addr).await
    }

    /// Binds an explicit address.
    pub async fn bind_to(state: Arc<ServerState>, addr: &str) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { state, listener })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.local_addr()?;
        tracing::info!(server = %self.state.name(), %addr, "Socket server listening");

        let tracker = ConnectionTracker::new();
        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, remote)) => {
                        let state = Arc::clone(&self.state);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            serve_connection(state, stream, remote, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!(server = %self.state.name(), "Stopping socket server");
                    break;
                }
            }
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait_for_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                active = tracker.active_connections(),
                "Shutdown grace period elapsed with open connections"
            );
        }
        Ok(())
    }
}

async fn serve_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    remote: SocketAddr,
    shutdown: ShutdownSignal,
) {
    let mut headers = HeaderMap::new();
    let capture = |request: &HandshakeRequest, response: HandshakeResponse| {
        headers = request.headers().clone();
        Ok::<_, ErrorResponse>(response)
    };
    let socket = match tokio_tungstenite::accept_hdr_async(stream, capture).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::debug!(%remote, error = %e, "Socket handshake failed");
            return;
        }
    };

    let connection = Uuid::now_v7();
    tracing::debug!(%connection, %remote, "Socket connected");

    let (mut sink, mut frames) = socket.split();
    let (responder, mut replies) = ChannelResponder::channel();
    let writer = tokio::spawn(async move {
        while let Some(reply) = replies.recv().await {
            if let Err(e) = sink.send(Message::text(reply.text())).await {
                tracing::debug!(error = %e, "Failed to write socket reply");
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&state, text.as_str(), &headers, responder.clone());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(%connection, error = %e, "Socket read failed");
                    break;
                }
            },
            () = shutdown.recv() => break,
        }
    }

    // In-flight messages keep their own responder clones; the writer stops
    // once the last of them is answered.
    drop(responder);
    if writer.await.is_err() {
        tracing::debug!(%connection, "Socket writer task panicked");
    }
    tracing::debug!(%connection, "Socket disconnected");
}

/// Runs one socket message through the pipeline.
pub fn dispatch(state: &Arc<ServerState>, text: &str, headers: &HeaderMap, responder: ChannelResponder) {
    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            Rejection {
                meta: RequestMeta::socket("")
                    .with_headers(headers.clone())
                    .with_server(state.name(), state.database()),
                status: None,
                error,
            }
            .send(state, responder);
            return;
        }
    };

    let handler = state.actions().resolve(&envelope.action).cloned();
    let meta = factory::socket_meta(state, envelope, headers.clone());
    let ctx = factory::build_context(state, meta, responder);
    let pipeline_state = Arc::clone(state);
    tokio::spawn(async move {
        pipeline_state.pipeline().execute(ctx, handler).await;
    });
}
