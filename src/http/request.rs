//! Request capture and outbound header translation.
//!
//! # Responsibilities
//! - Capture method, path, query, headers and body of an inbound request
//! - Decide between a buffered and a relayed request body
//! - Build the outbound header set for the upstream leg
//!
//! # Design Decisions
//! - The inbound `Host` is dropped at capture; the upstream authority
//!   replaces it on dispatch
//! - Duplicate headers survive in their original order
//! - Hop-by-hop headers never cross legs

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request};
use bytes::Bytes;
use thiserror::Error;

/// Request headers that belong to a single transport leg.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Failure reading the inbound request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(axum::Error),
}

/// Inbound request body, either fully read or relayed lazily.
#[derive(Debug)]
pub enum RequestBody {
    Buffered(Bytes),
    Streaming(Body),
}

impl RequestBody {
    fn empty() -> Self {
        Self::Buffered(Bytes::new())
    }
}

/// An inbound request as seen by the forwarding engine.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path without the query string, always starting with `/`.
    pub path: String,
    pub query: Option<String>,
    /// Inbound headers minus `Host`, duplicates preserved.
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ProxyRequest {
    /// Capture an inbound request.
    ///
    /// With `buffer_body` the body is read fully (up to `limit` bytes);
    /// otherwise it is relayed as a stream unless it is known to be empty.
    pub async fn capture(
        request: Request<Body>,
        buffer_body: bool,
        limit: usize,
    ) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();

        let mut headers = parts.headers;
        headers.remove(header::HOST);

        let body = if body.size_hint().exact() == Some(0) {
            RequestBody::empty()
        } else if buffer_body {
            let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
                if is_length_limit(&e) {
                    RequestError::BodyTooLarge { limit }
                } else {
                    RequestError::BodyRead(e)
                }
            })?;
            RequestBody::Buffered(bytes)
        } else {
            RequestBody::Streaming(body)
        };

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers,
            body,
        })
    }

    /// Relative path including the query string.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// The body bytes, when the body was buffered.
    pub fn buffered_body(&self) -> Option<&[u8]> {
        match &self.body {
            RequestBody::Buffered(bytes) => Some(bytes.as_ref()),
            RequestBody::Streaming(_) => None,
        }
    }

    /// Move the body out for dispatch, leaving an empty one behind.
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::replace(&mut self.body, RequestBody::empty())
    }

    /// Drop the body, keeping what diagnostics need.
    pub fn into_head(self) -> RequestHead {
        RequestHead {
            path_and_query: self.path_and_query(),
            method: self.method,
            headers: self.headers,
        }
    }
}

/// A request without its body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

/// Headers for the upstream request: inbound headers verbatim minus
/// hop-by-hop ones, with `Host` set to the upstream authority.
pub fn outbound_headers(inbound: &HeaderMap, authority: &str) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if *name == header::HOST || HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    match HeaderValue::from_str(authority) {
        Ok(host) => {
            headers.insert(header::HOST, host);
        }
        Err(e) => {
            tracing::warn!(authority = %authority, error = %e, "Upstream authority is not a valid Host value");
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_drops_host_and_keeps_duplicates() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/items?page=2")
            .header("host", "proxy.local:8080")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .body(Body::from("payload"))
            .unwrap();

        let captured = ProxyRequest::capture(request, true, 1024).await.unwrap();
        assert_eq!(captured.path, "/v1/items");
        assert_eq!(captured.query.as_deref(), Some("page=2"));
        assert_eq!(captured.path_and_query(), "/v1/items?page=2");
        assert!(captured.headers.get(header::HOST).is_none());
        let tags: Vec<_> = captured.headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(captured.buffered_body(), Some(b"payload".as_slice()));
    }

    #[tokio::test]
    async fn capture_enforces_body_limit() {
        let request = Request::builder()
            .uri("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();

        let err = ProxyRequest::capture(request, true, 16).await.unwrap_err();
        assert!(matches!(err, RequestError::BodyTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn capture_relays_body_when_not_buffering() {
        let request = Request::builder()
            .uri("/upload")
            .body(Body::from("streamed"))
            .unwrap();
        let captured = ProxyRequest::capture(request, false, 16).await.unwrap();
        assert!(matches!(captured.body, RequestBody::Streaming(_)));

        let empty = Request::builder().uri("/").body(Body::empty()).unwrap();
        let captured = ProxyRequest::capture(empty, false, 16).await.unwrap();
        assert_eq!(captured.buffered_body(), Some(b"".as_slice()));
    }

    #[test]
    fn outbound_headers_rewrite_host() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        inbound.append("cookie", HeaderValue::from_static("a=1"));
        inbound.append("cookie", HeaderValue::from_static("b=2"));

        let out = outbound_headers(&inbound, "api.internal:9000");
        assert_eq!(out.get(header::HOST).unwrap(), "api.internal:9000");
        assert_eq!(out.get(header::ACCEPT).unwrap(), "text/html");
        assert_eq!(out.get_all("cookie").iter().count(), 2);
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
    }
}
