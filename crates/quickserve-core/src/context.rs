//! Request context types.
//!
//! The [`Context`] is the capability set every middleware stage and route
//! handler works against. It is the same type for HTTP requests and socket
//! messages; only the [`Responder`] it finalizes into differs.
//!
//! A context is finalized exactly once. The first call to [`Context::send`]
//! or [`Context::error`] writes through the responder, every later call is a
//! silent no-op.

use crate::deadline::Deadline;
use crate::error::{QuickError, QuickResult};
use crate::format::{BuiltinSerializer, ResponseFormat, Serializer};
use crate::responder::{Reply, Responder};
use crate::session::Session;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Merged path, query and payload parameters.
pub type Params = Map<String, Value>;

/// A unique identifier for each request, using UUID v7.
///
/// # Example
///
/// ```
/// use quickserve_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which transport produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// An HTTP request.
    Http,
    /// A message received on a socket connection.
    Socket,
}

/// Transport-independent description of one inbound request.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Originating transport.
    pub transport: Transport,
    /// HTTP method. Socket messages carry none.
    pub method: Option<Method>,
    /// Socket action. HTTP requests carry none.
    pub action: Option<String>,
    /// Request path for HTTP, the action for sockets.
    pub url: String,
    /// Public base URL of the server, used for callback URLs.
    pub base_path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Merged parameters.
    pub params: Params,
    /// Decoded body.
    pub body: Value,
    /// Name of the server that accepted the request.
    pub server: String,
    /// Name of the database bound to that server.
    pub database: String,
}

impl RequestMeta {
    /// Describes an HTTP request.
    pub fn http(method: Method, url: impl Into<String>) -> Self {
        Self {
            transport: Transport::Http,
            method: Some(method),
            action: None,
            url: url.into(),
            base_path: String::new(),
            headers: HeaderMap::new(),
            params: Params::new(),
            body: Value::Null,
            server: String::new(),
            database: String::new(),
        }
    }

    /// Describes a socket message.
    pub fn socket(action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            transport: Transport::Socket,
            method: None,
            url: action.clone(),
            action: Some(action),
            base_path: String::new(),
            headers: HeaderMap::new(),
            params: Params::new(),
            body: Value::Null,
            server: String::new(),
            database: String::new(),
        }
    }

    /// Sets the base path.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Sets the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets one header, ignoring invalid names or values.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Sets the server and database names.
    pub fn with_server(mut self, server: impl Into<String>, database: impl Into<String>) -> Self {
        self.server = server.into();
        self.database = database.into();
        self
    }
}

/// Serializable snapshot of a request, used for logging.
#[derive(Debug, Clone, Serialize)]
pub struct RequestInfo {
    /// Request ID.
    pub id: RequestId,
    /// HTTP method, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Path or action.
    pub url: String,
    /// Base path.
    pub base_path: String,
    /// Headers with valid UTF-8 values.
    pub headers: BTreeMap<String, String>,
    /// Merged parameters.
    pub params: Params,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Server name.
    pub server: String,
    /// Database name.
    pub database: String,
    /// Current session.
    pub session: Session,
}

struct Inner {
    id: RequestId,
    meta: RequestMeta,
    format: ResponseFormat,
    serializer: Arc<dyn Serializer>,
    responder: Box<dyn Responder>,
    deadline: Deadline,
    started_at: Instant,
    session: Mutex<Session>,
    pending_status: Mutex<Option<StatusCode>>,
    pending_headers: Mutex<HeaderMap>,
    final_status: Mutex<Option<StatusCode>>,
    finalized: AtomicBool,
}

/// Per-request capability set shared by middleware and handlers.
///
/// Cloning is cheap; every clone refers to the same request.
///
/// # Example
///
/// ```
/// use quickserve_core::{ChannelResponder, Context, RequestMeta};
/// use http::Method;
///
/// let (responder, mut replies) = ChannelResponder::channel();
/// let ctx = Context::builder(RequestMeta::http(Method::GET, "/ping")).build(responder);
///
/// ctx.send(serde_json::json!({"pong": true})).unwrap();
/// ctx.send(serde_json::json!({"pong": false})).unwrap();
///
/// assert_eq!(replies.try_recv().unwrap().text(), r#"{"pong":true}"#);
/// assert!(replies.try_recv().is_err());
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("url", &self.inner.meta.url)
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

/// Builds a [`Context`] from a [`RequestMeta`] and a transport responder.
pub struct ContextBuilder {
    meta: RequestMeta,
    id: Option<RequestId>,
    format: ResponseFormat,
    serializer: Arc<dyn Serializer>,
    deadline: Deadline,
}

impl ContextBuilder {
    /// Sets the request ID.
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the response format.
    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the serializer used for response bodies.
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Arms the request deadline `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Deadline::after(timeout);
        self
    }

    /// Sets an already armed deadline.
    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Finishes the context, closing over `responder`.
    pub fn build(self, responder: impl Responder) -> Context {
        Context {
            inner: Arc::new(Inner {
                id: self.id.unwrap_or_default(),
                meta: self.meta,
                format: self.format,
                serializer: self.serializer,
                responder: Box::new(responder),
                deadline: self.deadline,
                started_at: Instant::now(),
                session: Mutex::new(Session::default()),
                pending_status: Mutex::new(None),
                pending_headers: Mutex::new(HeaderMap::new()),
                final_status: Mutex::new(None),
                finalized: AtomicBool::new(false),
            }),
        }
    }
}

impl Context {
    /// Starts building a context for `meta`.
    pub fn builder(meta: RequestMeta) -> ContextBuilder {
        ContextBuilder {
            meta,
            id: None,
            format: ResponseFormat::default(),
            serializer: Arc::new(BuiltinSerializer),
            deadline: Deadline::unbounded(),
        }
    }

    /// Returns the request ID.
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// Returns the originating transport.
    pub fn transport(&self) -> Transport {
        self.inner.meta.transport
    }

    /// Returns the HTTP method, if any.
    pub fn method(&self) -> Option<&Method> {
        self.inner.meta.method.as_ref()
    }

    /// Returns the socket action, if any.
    pub fn action(&self) -> Option<&str> {
        self.inner.meta.action.as_deref()
    }

    /// Returns the request path, or the action for socket messages.
    pub fn url(&self) -> &str {
        &self.inner.meta.url
    }

    /// Returns the server's public base path.
    pub fn base_path(&self) -> &str {
        &self.inner.meta.base_path
    }

    /// Returns all request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.meta.headers
    }

    /// Returns a header value if it is present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .meta
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Returns the merged parameters.
    pub fn params(&self) -> &Params {
        &self.inner.meta.params
    }

    /// Returns a single parameter.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.inner.meta.params.get(name)
    }

    /// Returns a parameter rendered as a string. Numbers and booleans are
    /// stringified; empty strings count as absent.
    pub fn param_str(&self, name: &str) -> Option<String> {
        match self.param(name)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns the decoded body.
    pub fn body(&self) -> &Value {
        &self.inner.meta.body
    }

    /// Returns the server name.
    pub fn server(&self) -> &str {
        &self.inner.meta.server
    }

    /// Returns the database name.
    pub fn database(&self) -> &str {
        &self.inner.meta.database
    }

    /// Returns the response format.
    pub fn format(&self) -> ResponseFormat {
        self.inner.format
    }

    /// Returns the request deadline.
    pub fn deadline(&self) -> &Deadline {
        &self.inner.deadline
    }

    /// Returns the time since the context was built.
    pub fn elapsed(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Returns a copy of the current session.
    pub fn session(&self) -> Session {
        self.inner.session.lock().clone()
    }

    /// Mutates the session in place.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.inner.session.lock())
    }

    /// Replaces the session.
    pub fn set_session(&self, session: Session) {
        *self.inner.session.lock() = session;
    }

    /// Returns a serializable snapshot of the request.
    pub fn info(&self) -> RequestInfo {
        let meta = &self.inner.meta;
        RequestInfo {
            id: self.inner.id,
            method: meta.method.as_ref().map(ToString::to_string),
            url: meta.url.clone(),
            base_path: meta.base_path.clone(),
            headers: meta
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect(),
            params: meta.params.clone(),
            timestamp: Utc::now(),
            server: meta.server.clone(),
            database: meta.database.clone(),
            session: self.session(),
        }
    }

    /// Sets the status the next `send` or `error` uses.
    pub fn status(&self, status: StatusCode) -> &Self {
        *self.inner.pending_status.lock() = Some(status);
        self
    }

    /// Returns the pending status, if one was set.
    pub fn pending_status(&self) -> Option<StatusCode> {
        *self.inner.pending_status.lock()
    }

    /// Adds a response header. Invalid names or values are ignored.
    pub fn set_header(&self, name: &str, value: &str) -> &Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.inner.pending_headers.lock().insert(name, value);
            }
            _ => tracing::debug!(header = name, "Ignoring invalid response header"),
        }
        self
    }

    /// Returns `true` once the response was written.
    pub fn is_finalized(&self) -> bool {
        self.inner.finalized.load(Ordering::Acquire)
    }

    /// Returns the status the response was written with.
    pub fn final_status(&self) -> Option<StatusCode> {
        *self.inner.final_status.lock()
    }

    /// Sends `data` with the pending status (200 by default).
    ///
    /// Fails if `data` serializes to `null`. Once the context is finalized
    /// this is a no-op.
    pub fn send<T: Serialize>(&self, data: T) -> QuickResult<()> {
        let value = serde_json::to_value(data)?;
        if value.is_null() {
            return Err(QuickError::internal("Response data is undefined"));
        }
        if self.is_finalized() {
            tracing::debug!(request_id = %self.inner.id, "Ignoring send on a finalized context");
            return Ok(());
        }

        let status = self.pending_status().unwrap_or(StatusCode::OK);
        let body = self.inner.serializer.serialize(self.inner.format, &value)?;
        self.finalize(status, self.inner.format.content_type(), body);
        Ok(())
    }

    /// Finalizes with an empty body, e.g. for CORS preflight.
    pub fn send_empty(&self, status: StatusCode) {
        if !self.is_finalized() {
            self.finalize(status, self.inner.format.content_type(), Bytes::new());
        }
    }

    /// Sends `err` as a structured error body.
    ///
    /// The pending status wins when it is an error status, otherwise the
    /// error's own status is used. Once the context is finalized this is a
    /// no-op.
    pub fn error(&self, err: QuickError) {
        if self.is_finalized() {
            tracing::debug!(request_id = %self.inner.id, error = %err, "Ignoring error on a finalized context");
            return;
        }

        match &err {
            QuickError::Internal { source, .. } | QuickError::Upstream { source, .. } => {
                tracing::error!(
                    request_id = %self.inner.id,
                    error = %err,
                    source = ?source.as_ref().map(|s| format!("{s:#}")),
                    "Request failed"
                );
            }
            _ => tracing::debug!(request_id = %self.inner.id, error = %err, "Request rejected"),
        }

        let status = self
            .pending_status()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or_else(|| err.status_code());

        let request_id = self.inner.id.to_string();
        let mut body = serde_json::to_value(err.to_envelope(Some(&request_id)))
            .unwrap_or_else(|_| Value::Object(Map::new()));
        if self.transport() == Transport::Socket {
            if let Value::Object(map) = &mut body {
                map.insert("status".into(), Value::from(status.as_u16()));
            }
        }

        let (content_type, bytes) = match self.inner.serializer.serialize(self.inner.format, &body) {
            Ok(bytes) => (self.inner.format.content_type(), bytes),
            Err(_) => (
                ResponseFormat::Json.content_type(),
                Bytes::from(body.to_string()),
            ),
        };
        self.finalize(status, content_type, bytes);
    }

    fn finalize(&self, status: StatusCode, content_type: &'static str, body: Bytes) {
        if self.inner.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.inner.final_status.lock() = Some(status);
        let headers = std::mem::take(&mut *self.inner.pending_headers.lock());
        self.inner.responder.deliver(Reply {
            status,
            headers,
            content_type,
            body,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelResponder;
    use serde_json::json;

    fn http_ctx() -> (Context, tokio::sync::mpsc::UnboundedReceiver<Reply>) {
        let (responder, rx) = ChannelResponder::channel();
        let meta = RequestMeta::http(Method::GET, "/users/1")
            .with_header("authorization", "Bearer abc")
            .with_params(json!({"id": "1", "page": 2}).as_object().cloned().unwrap());
        (Context::builder(meta).build(responder), rx)
    }

    #[test]
    fn test_send_then_error_writes_once() {
        let (ctx, mut rx) = http_ctx();
        ctx.send(json!({"ok": true})).unwrap();
        ctx.error(QuickError::internal("late"));

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert!(rx.try_recv().is_err());
        assert!(ctx.is_finalized());
    }

    #[test]
    fn test_error_then_send_writes_once() {
        let (ctx, mut rx) = http_ctx();
        ctx.error(QuickError::not_found("Not Found"));
        ctx.send(json!({"ok": true})).unwrap();

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert!(reply.text().contains("\"message\":\"Not Found\""));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_rejects_undefined() {
        let (ctx, mut rx) = http_ctx();
        assert!(ctx.send(()).is_err());
        assert!(ctx.send(Option::<u8>::None).is_err());
        assert!(!ctx.is_finalized());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_status_chains_into_send() {
        let (ctx, mut rx) = http_ctx();
        ctx.status(StatusCode::CREATED)
            .set_header("x-total", "3")
            .send(json!({"id": 1}))
            .unwrap();

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.headers["x-total"], "3");
        assert_eq!(ctx.final_status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn test_pending_error_status_wins_over_category() {
        let (ctx, mut rx) = http_ctx();
        ctx.status(StatusCode::FORBIDDEN)
            .error(QuickError::internal("denied"));
        assert_eq!(rx.try_recv().unwrap().status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_pending_success_status_does_not_mask_error() {
        let (ctx, mut rx) = http_ctx();
        ctx.status(StatusCode::CREATED)
            .error(QuickError::internal("boom"));
        assert_eq!(
            rx.try_recv().unwrap().status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_accessors() {
        let (ctx, _rx) = http_ctx();
        assert_eq!(ctx.method(), Some(&Method::GET));
        assert_eq!(ctx.url(), "/users/1");
        assert_eq!(ctx.header("authorization"), Some("Bearer abc"));
        assert_eq!(ctx.param_str("id").as_deref(), Some("1"));
        assert_eq!(ctx.param_str("page").as_deref(), Some("2"));
        assert!(ctx.param_str("missing").is_none());
        assert_eq!(ctx.transport(), Transport::Http);
    }

    #[test]
    fn test_socket_error_includes_status() {
        let (responder, mut rx) = ChannelResponder::channel();
        let ctx = Context::builder(RequestMeta::socket("get_users")).build(responder);
        ctx.error(QuickError::forbidden("Forbidden"));

        let body: Value = serde_json::from_slice(&rx.try_recv().unwrap().body).unwrap();
        assert_eq!(body["status"], 403);
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[test]
    fn test_session_is_shared_across_clones() {
        let (ctx, _rx) = http_ctx();
        let clone = ctx.clone();
        clone.with_session(|s| s.entity = Some("users".into()));
        assert_eq!(ctx.session().entity.as_deref(), Some("users"));
        assert_eq!(ctx.info().session.entity.as_deref(), Some("users"));
    }
}
