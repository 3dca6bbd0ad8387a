//! Context construction.
//!
//! Both transports funnel raw input through here. Parameters are merged in
//! a fixed order: path parameters first, then query parameters, which win
//! on conflict. Socket messages carry their parameters in the envelope.

use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use quickserve_core::{Context, Params, QuickError, QuickResult, RequestMeta, Responder};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::state::ServerState;

/// Message of the error sent for undecodable bodies.
pub const MALFORMED_BODY_MESSAGE: &str = "Malformed request body";

/// Message of the error sent for undecodable socket frames.
pub const MALFORMED_MESSAGE: &str = "Malformed message";

/// A request refused before it reaches the pipeline.
#[derive(Debug)]
pub struct Rejection {
    /// What is known about the request.
    pub meta: RequestMeta,
    /// Status overriding the error's own, if any.
    pub status: Option<StatusCode>,
    /// The reason.
    pub error: QuickError,
}

impl Rejection {
    /// Answers the request with its error.
    pub fn send(self, state: &ServerState, responder: impl Responder) {
        let ctx = build_context(state, self.meta, responder);
        if let Some(status) = self.status {
            ctx.status(status);
        }
        ctx.error(self.error);
    }
}

/// A decoded socket frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    /// Action name, routed like a path.
    pub action: String,
    /// Message parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Message body.
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// Decodes a text frame.
    pub fn parse(text: &str) -> QuickResult<Self> {
        serde_json::from_str(text).map_err(|e| {
            tracing::debug!(error = %e, "Rejected socket frame");
            QuickError::bad_request(MALFORMED_MESSAGE)
        })
    }
}

/// Merges decoded path parameters and query parameters.
///
/// Query parameters override path parameters of the same name.
pub fn merge_params(path: &quickserve_router::Params, query: Option<&str>) -> QuickResult<Params> {
    let mut params = Params::new();
    for (name, value) in path.iter() {
        let decoded = urlencoding::decode(value)
            .map_err(|_| QuickError::bad_request(format!("Invalid encoding in '{name}'")))?;
        params.insert(name.to_string(), Value::String(decoded.into_owned()));
    }
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|_| QuickError::bad_request("Malformed query string"))?;
        for (name, value) in pairs {
            params.insert(name, Value::String(value));
        }
    }
    Ok(params)
}

/// Decodes a request body according to its `Content-Type`.
///
/// An empty body is `null`. Form bodies become an object of strings; any
/// other body must be JSON.
pub fn decode_body(headers: &HeaderMap, body: &[u8]) -> QuickResult<Value> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|_| QuickError::bad_request(MALFORMED_BODY_MESSAGE))?;
        return Ok(Value::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ));
    }

    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        QuickError::bad_request(MALFORMED_BODY_MESSAGE)
    })
}

/// Describes an HTTP request from its head alone.
pub fn http_head(state: &ServerState, parts: Parts) -> RequestMeta {
    RequestMeta::http(parts.method, parts.uri.path())
        .with_headers(parts.headers)
        .with_base_path(state.base_path())
        .with_server(state.name(), state.database())
}

/// Describes an HTTP request, decoding its parameters and body.
pub fn http_meta(
    state: &ServerState,
    parts: Parts,
    body: &[u8],
    path_params: &quickserve_router::Params,
) -> Result<RequestMeta, Rejection> {
    let query = parts.uri.query().map(str::to_owned);
    let meta = http_head(state, parts);
    let decoded = merge_params(path_params, query.as_deref())
        .and_then(|params| Ok((params, decode_body(&meta.headers, body)?)));
    match decoded {
        Ok((params, body)) => Ok(meta.with_params(params).with_body(body)),
        Err(error) => Err(Rejection {
            meta,
            status: None,
            error,
        }),
    }
}

/// Builds the request description of a socket message.
///
/// `headers` are the ones sent with the connection upgrade.
pub fn socket_meta(state: &ServerState, envelope: Envelope, headers: HeaderMap) -> RequestMeta {
    RequestMeta::socket(envelope.action)
        .with_headers(headers)
        .with_params(envelope.params)
        .with_body(envelope.body)
        .with_base_path(state.base_path())
        .with_server(state.name(), state.database())
}

/// Creates the context of one request, arming its deadline.
pub fn build_context(state: &ServerState, meta: RequestMeta, responder: impl Responder) -> Context {
    Context::builder(meta)
        .format(state.format())
        .serializer(state.serializer())
        .timeout(state.timeout())
        .build(responder)
}
