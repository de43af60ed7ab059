//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every listener stops accepting → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the signal out to every listener
//! - No reload: configuration is fixed for the life of the process

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
