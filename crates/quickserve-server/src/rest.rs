//! HTTP transport for `rest` and `file` servers.
//!
//! Built on hyper's HTTP/1 connection driver. Each request is resolved
//! against the server's router, turned into a [`Context`](quickserve_core::Context)
//! and run through the pipeline on its own task, so a client that hangs up
//! never cancels a handler halfway.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use quickserve_core::{OneshotResponder, QuickError, Reply};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::error::{ServerError, ServerResult};
use crate::factory::{self, Rejection};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::state::ServerState;

/// Response body type.
pub type ResponseBody = Full<Bytes>;

/// Response type.
pub type HttpResponse = Response<ResponseBody>;

/// How long open connections may keep running after shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// An HTTP server bound to its address.
#[derive(Debug)]
pub struct HttpServer {
    state: Arc<ServerState>,
    listener: TcpListener,
}

impl HttpServer {
    /// Binds the server's configured address.
    pub async fn bind(state: Arc<ServerState>) -> ServerResult<Self> {
        let addr = state.config().addr();
        Self::bind_to(state, &addr).await
    }

    /// Binds an explicit address, e.g. `127.0.0.1:0` in tests.
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

    /// Accepts connections until `shutdown` fires, then waits for open
    /// connections for at most [`SHUTDOWN_GRACE`].
    pub async fn run(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.local_addr()?;
        tracing::info!(server = %self.state.name(), %addr, "HTTP server listening");

        let tracker = ConnectionTracker::new();
        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, remote)) => {
                        let state = Arc::clone(&self.state);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(state, stream, shutdown).await {
                                tracing::debug!(%remote, error = %e, "Connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!(server = %self.state.name(), "Stopping HTTP server");
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
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { handle_request(state, req).await }
    });
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);

    tokio::select! {
        result = conn => result,
        () = shutdown.recv() => Ok(()),
    }
}

/// Handles one HTTP request end to end.
pub async fn handle_request<B>(
    state: Arc<ServerState>,
    req: Request<B>,
) -> Result<HttpResponse, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let (responder, reply) = OneshotResponder::channel();

    let resolved = state
        .routes()
        .resolve(&parts.method, parts.uri.path())
        .map(|matched| (Arc::clone(matched.handler()), matched.into_params()));
    let (handler, path_params) = match resolved {
        Some((handler, params)) => (Some(handler), params),
        None => (None, quickserve_router::Params::new()),
    };

    let bytes = match Limited::new(body, state.body_limit()).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let (status, message) = if e.downcast_ref::<LengthLimitError>().is_some() {
                (Some(StatusCode::PAYLOAD_TOO_LARGE), "Request body too large")
            } else {
                (None, "Request body could not be read")
            };
            Rejection {
                meta: factory::http_head(&state, parts),
                status,
                error: QuickError::bad_request(message),
            }
            .send(&state, responder);
            return Ok(into_response(reply).await);
        }
    };

    match factory::http_meta(&state, parts, &bytes, &path_params) {
        Ok(meta) => {
            let ctx = factory::build_context(&state, meta, responder);
            let pipeline_state = Arc::clone(&state);
            tokio::spawn(async move {
                pipeline_state.pipeline().execute(ctx, handler).await;
            });
        }
        Err(rejection) => rejection.send(&state, responder),
    }
    Ok(into_response(reply).await)
}

async fn into_response(reply: oneshot::Receiver<Reply>) -> HttpResponse {
    match reply.await {
        Ok(reply) => {
            let mut response = Response::new(Full::new(reply.body));
            *response.status_mut() = reply.status;
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(reply.content_type));
            headers.extend(reply.headers);
            response
        }
        Err(_) => {
            tracing::error!("Request finished without a reply");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Services;
    use quickserve_config::QuickServeConfig;
    use serde_json::Value;

    fn state(limit_mb: u32) -> Arc<ServerState> {
        let mut config = QuickServeConfig::default();
        config.servers[0].request.limit = limit_mb;
        let services = Services::from_config(&config).unwrap();
        Arc::new(ServerState::new(config.servers[0].clone(), &services).unwrap())
    }

    async fn json(response: HttpResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let req = Request::get("/nowhere").body(Full::new(Bytes::new())).unwrap();
        let response = handle_request(state(10), req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = json(response).await;
        assert_eq!(body["message"], "Not Found");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let req = Request::post("/system/search")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(b"{oops")))
            .unwrap();
        let response = handle_request(state(10), req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let body = Bytes::from(vec![b' '; 1024 * 1024 + 1]);
        let req = Request::post("/anything").body(Full::new(body)).unwrap();
        let response = handle_request(state(1), req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_preflight_is_answered_by_cors() {
        let req = Request::options("/anything")
            .header("origin", "http://example.com")
            .header("access-control-request-method", "POST")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handle_request(state(10), req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://example.com"
        );
    }
}
