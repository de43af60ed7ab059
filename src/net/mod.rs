//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     listener.rs (one TcpListener per route port)
//!     → ConnectionAddrs (local port selects the route)
//!     → Hand off to HTTP layer
//!
//! Outbound:
//!     forwarding engine → pool.rs (permit, optional forward proxy)
//!     → upstream
//! ```
//!
//! # Design Decisions
//! - One shared outbound pool for every listener, hard-capped
//! - A pooled slot lives as long as the upstream body it serves
//! - Shutdown stops every listener together

pub mod listener;
pub mod pool;

pub use listener::{ConnectionAddrs, ListenerError, ListenerSet};
pub use pool::{PooledResponse, TransportError, UpstreamPool, UpstreamRequest};
