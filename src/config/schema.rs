//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the rewriting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host).
    pub listener: ListenerConfig,

    /// One route per listening port.
    pub routes: Vec<RouteConfig>,

    /// Outbound connection settings.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Streaming detection policy.
    pub streaming: StreamingConfig,

    /// Response body rewriting.
    pub rewrite: RewriteConfig,

    /// Size limits.
    pub limits: LimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host every route port is bound on (e.g., "0.0.0.0").
    pub bind_host: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
        }
    }
}

/// Route configuration: one listening port forwarding to one upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Local port the listener binds.
    pub listen_port: u16,

    /// Upstream base URL (e.g., "http://api.internal").
    pub upstream: String,

    /// Public URL substituted for `upstream` in textual bodies.
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Outbound connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Optional forward proxy used for every upstream request.
    pub proxy_url: Option<String>,

    /// Hard cap on concurrent outbound connections.
    pub max_connections: usize,

    /// Idle connections kept per upstream host.
    pub pool_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            max_connections: 600,
            pool_idle_per_host: 32,
        }
    }
}

/// Timeout configuration for upstream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream response head, and for the whole body
    /// on the buffered path, in seconds.
    pub request_secs: u64,

    /// Maximum silence between two upstream body reads in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 300,
            idle_secs: 120,
        }
    }
}

/// Which side of the exchange declares that a response is streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamingPolicyKind {
    /// Decided before dispatch from the query, path or JSON body.
    RequestDeclared,
    /// Decided from the upstream response headers.
    #[default]
    ResponseDeclared,
}

impl std::str::FromStr for StreamingPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "request" | "request_declared" => Ok(Self::RequestDeclared),
            "response" | "response_declared" => Ok(Self::ResponseDeclared),
            other => Err(format!("unknown streaming policy: {other}")),
        }
    }
}

/// Streaming classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Active policy for this deployment.
    pub policy: StreamingPolicyKind,

    /// Path suffixes that mark an incremental-generation endpoint.
    pub path_suffixes: Vec<String>,

    /// Query parameter that requests streaming when set to `true`.
    pub query_param: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            policy: StreamingPolicyKind::ResponseDeclared,
            path_suffixes: vec![
                ":streamGenerateContent".to_string(),
                "streamGenerateContent".to_string(),
            ],
            query_param: "stream".to_string(),
        }
    }
}

/// Response rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Mime-type prefixes treated as textual.
    pub content_types: Vec<String>,

    /// Re-encode rewritten bodies with their original content coding.
    ///
    /// When set, a buffered body that was decoded goes out encoded again and
    /// its `Content-Encoding` is re-emitted. This is the one case where the
    /// client sees `Content-Encoding`; streamed responses never carry it.
    pub recompress: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            content_types: vec!["text/".to_string(), "application/xhtml+xml".to_string()],
            recompress: false,
        }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum buffered request body in bytes.
    pub max_request_body: usize,

    /// Bytes of a non-200 response body included in diagnostics.
    pub log_body_snippet: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_request_body: 64 * 1024 * 1024, // 64MB
            log_body_snippet: 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
