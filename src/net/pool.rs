//! Shared outbound connection pool.
//!
//! # Responsibilities
//! - Own the one HTTP client every listener dispatches through
//! - Enforce the global cap on concurrent upstream exchanges
//! - Route through the optional forward proxy, never follow redirects
//! - Classify transport failures
//!
//! # Design Decisions
//! - A semaphore permit is held until the upstream body is consumed or
//!   dropped, so a streamed response keeps its slot while it is relayed
//! - Waiting for a permit never blocks any accept loop
//! - No transparent decompression: bodies arrive as the upstream sent them

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::http::request::RequestBody;

/// Failure reaching or reading from the upstream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("connection to upstream failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read upstream body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("connection pool closed")]
    PoolClosed,
}

impl TransportError {
    fn from_send(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else if error.is_connect() {
            Self::Connect(error)
        } else {
            Self::Request(error)
        }
    }
}

/// One outbound request.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// Bounded pool of outbound connections.
#[derive(Debug)]
pub struct UpstreamPool {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_connections: usize,
    request_timeout: Duration,
}

impl UpstreamPool {
    /// Build the pool from configuration.
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .read_timeout(Duration::from_secs(timeouts.idle_secs))
            .pool_max_idle_per_host(upstream.pool_idle_per_host);

        builder = match &upstream.proxy_url {
            Some(proxy) => {
                tracing::info!(proxy = %proxy, "Routing upstream traffic through forward proxy");
                builder.proxy(reqwest::Proxy::all(proxy).map_err(TransportError::Client)?)
            }
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(TransportError::Client)?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(upstream.max_connections)),
            max_connections: upstream.max_connections,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        })
    }

    /// Send `request` once a connection slot is free.
    pub async fn dispatch(&self, request: UpstreamRequest) -> Result<PooledResponse, TransportError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::PoolClosed)?;

        let body = match request.body {
            RequestBody::Buffered(bytes) => reqwest::Body::from(bytes),
            RequestBody::Streaming(body) => reqwest::Body::wrap_stream(body.into_data_stream()),
        };

        let send = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .body(body)
            .send();

        let response = match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(TransportError::from_send(e, self.request_timeout)),
            Err(_) => return Err(TransportError::Timeout(self.request_timeout)),
        };

        Ok(PooledResponse {
            response,
            permit,
            body_timeout: self.request_timeout,
        })
    }

    /// Connection slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// An upstream response holding its connection slot.
#[derive(Debug)]
pub struct PooledResponse {
    response: reqwest::Response,
    permit: OwnedSemaphorePermit,
    body_timeout: Duration,
}

impl PooledResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Read the whole body, releasing the slot afterwards.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        let Self {
            response,
            permit,
            body_timeout,
        } = self;
        let result = match tokio::time::timeout(body_timeout, response.bytes()).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) if e.is_timeout() => Err(TransportError::Timeout(body_timeout)),
            Ok(Err(e)) => Err(TransportError::Body(e)),
            Err(_) => Err(TransportError::Timeout(body_timeout)),
        };
        drop(permit);
        result
    }

    /// Relay the body chunk by chunk; the slot is released when the
    /// stream finishes or is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, TransportError>> + Send + 'static {
        let Self { response, permit, .. } = self;
        response
            .bytes_stream()
            .map(move |chunk| {
                let _slot = &permit;
                chunk
            })
            .map_err(TransportError::Body)
    }
}
