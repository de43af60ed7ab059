//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by port, status, mode
//! - `proxy_request_duration_seconds` (histogram): latency by port, mode
//! - `proxy_upstream_errors_total` (counter): transport failures by port
//! - `proxy_rewrite_fallbacks_total` (counter): degraded body transforms by stage
//! - `proxy_pool_available` (gauge): free upstream connection slots
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels stay low-cardinality: port, status code, mode, stage
//! - Streamed requests are recorded when the body ends or the client
//!   drops it, so their duration covers the whole relay
//! - A streamed body that fails after its headers were sent counts as an
//!   upstream error and keeps its original status label

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// How a response body was relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Streamed,
    Buffered,
    Failed,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Streamed => "streamed",
            Mode::Buffered => "buffered",
            Mode::Failed => "failed",
        }
    }
}

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(port: u16, status: u16, mode: Mode, start: Instant) {
    let port = port.to_string();
    counter!(
        "proxy_requests_total",
        "port" => port.clone(),
        "status" => status.to_string(),
        "mode" => mode.as_str()
    )
    .increment(1);
    histogram!(
        "proxy_request_duration_seconds",
        "port" => port,
        "mode" => mode.as_str()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(port: u16) {
    counter!("proxy_upstream_errors_total", "port" => port.to_string()).increment(1);
}

pub fn record_rewrite_fallback(stage: &'static str) {
    counter!("proxy_rewrite_fallbacks_total", "stage" => stage).increment(1);
}

pub fn set_pool_available(available: usize) {
    gauge!("proxy_pool_available").set(available as f64);
}
