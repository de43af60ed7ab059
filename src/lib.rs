//! Multi-listener URL-rewriting reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener (one per port) ──▶ http::server ──▶ http::forward
//!                                                                  │
//!                              routing (port → route) ◀────────────┤
//!                              streaming (stream | buffer) ◀───────┤
//!                              net::pool (cap, forward proxy) ◀────┤──▶ Upstream
//!                              body (decompress, rewrite) ◀────────┘
//!
//!     Cross-cutting: config, observability, lifecycle
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Response handling
pub mod body;
pub mod streaming;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::{ForwardingEngine, HttpServer};
pub use lifecycle::Shutdown;
