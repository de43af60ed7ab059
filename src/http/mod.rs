//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Listener connection
//!     → server.rs (Axum router, request ID, trace span)
//!     → forward.rs (route by local port, dispatch, stream or buffer)
//!         → request.rs (capture, outbound headers)
//!         → response.rs (filter headers, 502 synthesis)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{EngineError, ForwardingEngine};
pub use server::{build_router, HttpServer};
