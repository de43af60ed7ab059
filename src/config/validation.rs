//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route integrity (unique ports, absolute URLs)
//! - Validate value ranges (pool size > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before any listener is bound

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no routes configured")]
    NoRoutes,

    #[error("port {0} is configured for more than one route")]
    DuplicatePort(u16),

    #[error("route {index}: port 0 is not a valid listening port")]
    ZeroPort { index: usize },

    #[error("route {index}: upstream {url:?} is not an absolute http(s) URL")]
    InvalidUpstream { index: usize, url: String },

    #[error("route {index}: upstream {url:?} must not end with '/'")]
    TrailingSlash { index: usize, url: String },

    #[error("route {index}: public URL {url:?} is not an absolute URL")]
    InvalidPublicUrl { index: usize, url: String },

    #[error("forward proxy URL {0:?} is invalid")]
    InvalidProxyUrl(String),

    #[error("upstream.max_connections must be greater than 0")]
    ZeroConnections,

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,
}

/// Validate a fully assembled configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.listen_port == 0 {
            errors.push(ValidationError::ZeroPort { index });
        } else if !seen.insert(route.listen_port) {
            errors.push(ValidationError::DuplicatePort(route.listen_port));
        }

        if !is_http_url(&route.upstream) {
            errors.push(ValidationError::InvalidUpstream {
                index,
                url: route.upstream.clone(),
            });
        } else if route.upstream.ends_with('/') {
            errors.push(ValidationError::TrailingSlash {
                index,
                url: route.upstream.clone(),
            });
        }

        if let Some(public) = &route.public_url {
            if Url::parse(public).is_err() {
                errors.push(ValidationError::InvalidPublicUrl {
                    index,
                    url: public.clone(),
                });
            }
        }
    }

    if let Some(proxy) = &config.upstream.proxy_url {
        if Url::parse(proxy).is_err() {
            errors.push(ValidationError::InvalidProxyUrl(proxy.clone()));
        }
    }

    if config.upstream.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}
