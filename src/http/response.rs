//! Response handling and transformation.
//!
//! # Responsibilities
//! - Filter upstream headers before they reach the client
//! - Assemble streamed and buffered client responses
//! - Map transport failures to 502 Bad Gateway
//!
//! # Design Decisions
//! - Encoding and framing headers are recomputed on the client leg
//! - Failure detail is logged, never sent to the client

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Upstream response headers that never reach the client.
const STRIPPED: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
];

/// Copy upstream headers for the client leg, duplicates preserved.
pub fn filter_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if STRIPPED.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Build a client response from a status, filtered headers and a body.
pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// The synthesized response for a failed upstream dispatch.
pub fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        "Bad Gateway",
    )
        .into_response()
}

/// Plain-text response for requests rejected before dispatch.
pub fn plain(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        message,
    )
        .into_response()
}
