//! Per-request forwarding pipeline.
//!
//! # Responsibilities
//! - Resolve the route for the port a request arrived on
//! - Translate the request and dispatch it through the shared pool
//! - Relay the response streamed or buffered, rewriting buffered bodies
//! - Turn transport failures into 502 Bad Gateway
//!
//! # Request States
//! ```text
//! RECEIVED → DISPATCHING → STREAMING → COMPLETED
//!                        → BUFFERING → COMPLETED
//!          (any of the three) → FAILED (502)
//! ```

use std::borrow::Cow;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use thiserror::Error;

use crate::body::{BodyRewriter, RewriteContext};
use crate::config::{ConfigError, LimitConfig, ProxyConfig};
use crate::http::request::{outbound_headers, ProxyRequest, RequestError, RequestHead};
use crate::http::response::{bad_gateway, build_response, filter_response_headers, plain};
use crate::net::pool::{PooledResponse, TransportError, UpstreamPool, UpstreamRequest};
use crate::observability::metrics::{self, Mode};
use crate::routing::{Route, RouteTable};
use crate::streaming::StreamingClassifier;

/// Failure assembling the engine at startup.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Shared, immutable forwarding state used by every listener.
#[derive(Debug)]
pub struct ForwardingEngine {
    routes: RouteTable,
    pool: UpstreamPool,
    classifier: StreamingClassifier,
    rewriter: BodyRewriter,
    limits: LimitConfig,
}

impl ForwardingEngine {
    pub fn new(config: &ProxyConfig) -> Result<Self, EngineError> {
        let routes = RouteTable::from_config(&config.routes)?;
        let pool = UpstreamPool::new(&config.upstream, &config.timeouts)?;
        metrics::set_pool_available(pool.available());

        Ok(Self {
            routes,
            pool,
            classifier: StreamingClassifier::from_config(&config.streaming),
            rewriter: BodyRewriter::new(&config.rewrite),
            limits: config.limits.clone(),
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn pool(&self) -> &UpstreamPool {
        &self.pool
    }

    /// Forward one request received on `port`.
    ///
    /// Never fails: every outcome is a client response.
    pub async fn forward(&self, port: u16, request: Request<Body>) -> Response {
        let start = Instant::now();

        let route = match self.routes.resolve(port) {
            Ok(route) => route,
            Err(e) => {
                tracing::error!(port, error = %e, "Request on a port with no route");
                metrics::record_request(port, 500, Mode::Failed, start);
                return plain(StatusCode::INTERNAL_SERVER_ERROR, "No route for this port");
            }
        };

        // RECEIVED
        let needs_body = self.classifier.needs_request_body();
        let mut request =
            match ProxyRequest::capture(request, needs_body, self.limits.max_request_body).await {
                Ok(request) => request,
                Err(e) => return self.reject(port, e, start),
            };
        let declared_early = needs_body.then(|| self.classifier.is_streaming(&request, None));

        // DISPATCHING
        let target = route.target_url(&request.path_and_query());
        let upstream_request = UpstreamRequest {
            method: request.method.clone(),
            url: target.clone(),
            headers: outbound_headers(&request.headers, &route.authority),
            body: request.take_body(),
        };

        let upstream = match self.pool.dispatch(upstream_request).await {
            Ok(upstream) => upstream,
            Err(e) => return self.fail(port, &request.method, &target, e, start),
        };
        metrics::set_pool_available(self.pool.available());

        let streaming = declared_early
            .unwrap_or_else(|| self.classifier.is_streaming(&request, Some(upstream.headers())));
        let request = request.into_head();

        tracing::info!(
            port,
            method = %request.method,
            target = %target,
            status = upstream.status().as_u16(),
            mode = if streaming { "stream" } else { "buffer" },
            "Forwarding response"
        );

        if streaming {
            self.relay_stream(port, &request, upstream, start)
        } else {
            self.relay_buffered(port, route, &request, &target, upstream, start)
                .await
        }
    }

    /// STREAMING: relay chunks as they arrive, untouched.
    fn relay_stream(
        &self,
        port: u16,
        request: &RequestHead,
        upstream: PooledResponse,
        start: Instant,
    ) -> Response {
        let status = upstream.status();
        let headers = filter_response_headers(upstream.headers());
        if status != StatusCode::OK {
            log_non_ok(port, status, request, None);
        }

        let body = observe_stream(port, status, start, upstream.into_stream());
        build_response(status, headers, Body::from_stream(body))
    }

    /// BUFFERING: read the whole body, decode and rewrite it, emit once.
    async fn relay_buffered(
        &self,
        port: u16,
        route: &Route,
        request: &RequestHead,
        target: &str,
        upstream: PooledResponse,
        start: Instant,
    ) -> Response {
        let status = upstream.status();
        let mut headers = filter_response_headers(upstream.headers());
        let ctx = RewriteContext {
            target_url: route.upstream.clone(),
            public_url: route.public_url.clone(),
            content_encoding: header_string(upstream.headers(), header::CONTENT_ENCODING),
            content_type: header_string(upstream.headers(), header::CONTENT_TYPE),
        };

        let body = match upstream.bytes().await {
            Ok(body) => body,
            Err(e) => return self.fail(port, &request.method, target, e, start),
        };
        metrics::set_pool_available(self.pool.available());

        let transformed = self.rewriter.transform(&ctx, body);
        if let Some(coding) = &transformed.content_encoding {
            if let Ok(value) = HeaderValue::from_str(coding) {
                headers.insert(header::CONTENT_ENCODING, value);
            }
        }
        if transformed.rewritten {
            tracing::debug!(port, target = %target, "Rewrote upstream URLs in body");
        }

        if status != StatusCode::OK {
            log_non_ok(
                port,
                status,
                request,
                Some(snippet(&transformed.body, self.limits.log_body_snippet)),
            );
        }

        metrics::record_request(port, status.as_u16(), Mode::Buffered, start);
        build_response(status, headers, Body::from(transformed.body))
    }

    /// FAILED: detail to the log, 502 to the client.
    fn fail(
        &self,
        port: u16,
        method: &Method,
        target: &str,
        error: TransportError,
        start: Instant,
    ) -> Response {
        tracing::error!(
            port,
            method = %method,
            target = %target,
            error = %error,
            "Upstream transport failure"
        );
        metrics::record_upstream_error(port);
        metrics::record_request(port, 502, Mode::Failed, start);
        bad_gateway()
    }

    fn reject(&self, port: u16, error: RequestError, start: Instant) -> Response {
        let (status, message) = match &error {
            RequestError::BodyTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
            RequestError::BodyRead(_) => (StatusCode::BAD_REQUEST, "Unreadable request body"),
        };
        tracing::warn!(port, error = %error, "Rejecting request before dispatch");
        metrics::record_request(port, status.as_u16(), Mode::Failed, start);
        plain(status, message)
    }
}

/// Records a streamed request when its body is dropped, which happens once
/// the stream ends or the client goes away.
struct StreamRecord {
    port: u16,
    status: u16,
    start: Instant,
}

impl Drop for StreamRecord {
    fn drop(&mut self) {
        metrics::record_request(self.port, self.status, Mode::Streamed, self.start);
    }
}

/// Log and count upstream failures in the middle of a streamed body.
///
/// A client disconnect drops the stream without an error and is not logged.
fn observe_stream<S>(
    port: u16,
    status: StatusCode,
    start: Instant,
    stream: S,
) -> impl Stream<Item = Result<Bytes, TransportError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
    let record = StreamRecord {
        port,
        status: status.as_u16(),
        start,
    };
    stream
        .inspect_err(move |e| {
            tracing::warn!(port, error = %e, "Upstream stream aborted");
            metrics::record_upstream_error(port);
        })
        .map(move |chunk| {
            let _record = &record;
            chunk
        })
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn log_non_ok(port: u16, status: StatusCode, request: &RequestHead, body: Option<Cow<'_, str>>) {
    tracing::warn!(
        port,
        status = status.as_u16(),
        method = %request.method,
        path = %request.path_and_query,
        request_headers = ?request.headers,
        body = body.as_deref().unwrap_or("<streamed>"),
        "Upstream returned non-200 status"
    );
}

/// At most `limit` bytes of `body`, lossily decoded for logging.
fn snippet(body: &[u8], limit: usize) -> Cow<'_, str> {
    String::from_utf8_lossy(&body[..body.len().min(limit)])
}
