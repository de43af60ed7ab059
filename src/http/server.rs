//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, trace span)
//! - Bind the listener set and serve until shutdown

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::forward::{EngineError, ForwardingEngine};
use crate::http::response::plain;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionAddrs, ListenerError, ListenerSet};

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    engine: Arc<ForwardingEngine>,
    bind_host: String,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ProxyConfig) -> Result<Self, EngineError> {
        Ok(Self {
            engine: Arc::new(ForwardingEngine::new(config)?),
            bind_host: config.listener.bind_host.clone(),
        })
    }

    /// Bind one listener per route, then serve until `shutdown`.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ListenerError> {
        let listeners = ListenerSet::bind(&self.bind_host, self.engine.routes()).await?;
        self.run_on(listeners, shutdown).await
    }

    /// Serve on listeners that are already bound.
    pub async fn run_on(self, listeners: ListenerSet, shutdown: Shutdown) -> Result<(), ListenerError> {
        tracing::info!(
            listeners = self.engine.routes().len(),
            max_connections = self.engine.pool().max_connections(),
            "HTTP server starting"
        );
        listeners.serve(build_router(self.engine), shutdown).await?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(engine: Arc<ForwardingEngine>) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(engine)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// Main proxy handler.
/// Routes by the port the connection was accepted on.
async fn proxy_handler(
    State(engine): State<Arc<ForwardingEngine>>,
    ConnectInfo(addrs): ConnectInfo<ConnectionAddrs>,
    request: Request<Body>,
) -> Response {
    let Some(local) = addrs.local else {
        tracing::error!(peer = %addrs.peer, "Local address unavailable for connection");
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "No route for this port");
    };

    tracing::debug!(
        port = local.port(),
        peer = %addrs.peer,
        method = %request.method(),
        path = %request.uri().path(),
        "Proxying request"
    );

    engine.forward(local.port(), request).await
}
