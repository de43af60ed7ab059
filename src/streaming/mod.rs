//! Streaming classification subsystem.
//!
//! # Data Flow
//! ```text
//! Request-declared policy (before dispatch):
//!     ProxyRequest → classifier.rs → stream | buffer
//!
//! Response-declared policy (after upstream headers arrive):
//!     ProxyRequest + upstream HeaderMap → classifier.rs → stream | buffer
//! ```

pub mod classifier;

pub use classifier::{RequestMarkers, StreamingClassifier};
