//! Stream-vs-buffer decision.
//!
//! # Responsibilities
//! - Request-declared policy: `?stream=true`, streaming path suffix, or a
//!   JSON body with a truthy `stream` field
//! - Response-declared policy: no `Content-Length`, or chunked
//!   `Transfer-Encoding`
//!
//! # Design Decisions
//! - One pure decision function, no I/O
//! - Exactly one policy per deployment
//! - Unparseable bodies count as "not streaming"

use axum::http::{header, HeaderMap};
use serde_json::Value;

use crate::config::{StreamingConfig, StreamingPolicyKind};
use crate::http::request::ProxyRequest;

/// Markers a caller uses to ask for an incremental response.
#[derive(Debug, Clone)]
pub struct RequestMarkers {
    pub query_param: String,
    pub path_suffixes: Vec<String>,
}

/// Configured streaming classifier.
#[derive(Debug, Clone)]
pub enum StreamingClassifier {
    RequestDeclared(RequestMarkers),
    ResponseDeclared,
}

impl StreamingClassifier {
    pub fn from_config(config: &StreamingConfig) -> Self {
        match config.policy {
            StreamingPolicyKind::RequestDeclared => Self::RequestDeclared(RequestMarkers {
                query_param: config.query_param.clone(),
                path_suffixes: config.path_suffixes.clone(),
            }),
            StreamingPolicyKind::ResponseDeclared => Self::ResponseDeclared,
        }
    }

    /// The request body must be buffered for this policy to inspect it.
    pub fn needs_request_body(&self) -> bool {
        matches!(self, Self::RequestDeclared(_))
    }

    /// Decide whether the response to `request` is relayed incrementally.
    ///
    /// The request-declared policy ignores `response`; the
    /// response-declared policy answers `false` until headers are known.
    pub fn is_streaming(&self, request: &ProxyRequest, response: Option<&HeaderMap>) -> bool {
        match self {
            Self::RequestDeclared(markers) => markers.declared_by(request),
            Self::ResponseDeclared => response.is_some_and(declared_by_response),
        }
    }
}

impl RequestMarkers {
    fn declared_by(&self, request: &ProxyRequest) -> bool {
        self.in_query(request.query.as_deref())
            || self.in_path(&request.path)
            || request.buffered_body().is_some_and(body_requests_stream)
    }

    fn in_query(&self, query: Option<&str>) -> bool {
        query.is_some_and(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(name, value)| name == self.query_param.as_str() && value.eq_ignore_ascii_case("true"))
        })
    }

    fn in_path(&self, path: &str) -> bool {
        self.path_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && path.ends_with(suffix.as_str()))
    }
}

fn body_requests_stream(body: &[u8]) -> bool {
    if body.is_empty() {
        return false;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value.get("stream").is_some_and(is_truthy),
        Err(_) => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn declared_by_response(headers: &HeaderMap) -> bool {
    let chunked = headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));

    chunked || !headers.contains_key(header::CONTENT_LENGTH)
}
