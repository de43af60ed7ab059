//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (local socket address)
//!     → port
//!     → router.rs (route lookup)
//!     → Return: Route or UnknownPort
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse upstream authority
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: a port always maps to the same route
//! - Headers never influence route selection

pub mod router;

pub use router::{Route, RouteTable};
