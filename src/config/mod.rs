//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment (.env, PROXY_URL / TARGET_URLS / SERVER_PORTS / SERVER_URLS)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to the listener set and forwarding engine
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - The positional environment lists are folded into one route list once
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError};
pub use schema::{
    LimitConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig, RewriteConfig, RouteConfig,
    StreamingConfig, StreamingPolicyKind, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
