//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, RouteConfig, StreamingPolicyKind};
use crate::config::validation::{validate_config, ValidationError};

/// Forward proxy for every outbound request.
pub const ENV_PROXY_URL: &str = "PROXY_URL";
/// Upstream base URLs, one per listener.
pub const ENV_TARGET_URLS: &str = "TARGET_URLS";
/// Listening ports, positionally aligned with `TARGET_URLS`.
pub const ENV_SERVER_PORTS: &str = "SERVER_PORTS";
/// Public rewrite URLs, positionally aligned with `TARGET_URLS`.
pub const ENV_SERVER_URLS: &str = "SERVER_URLS";
pub const ENV_STREAMING_POLICY: &str = "STREAMING_POLICY";
pub const ENV_MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("No route registered for port {0}")]
    UnknownPort(u16),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the effective configuration: optional file, then environment
/// overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides through `lookup`.
///
/// When `TARGET_URLS` is set, the route list is replaced by the positional
/// lists; `SERVER_PORTS` must then be set with the same length, and
/// `SERVER_URLS` (if set) too.
pub fn apply_env<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(proxy) = lookup(ENV_PROXY_URL).filter(|v| !v.trim().is_empty()) {
        config.upstream.proxy_url = Some(proxy.trim().to_string());
    }

    if let Some(policy) = lookup(ENV_STREAMING_POLICY) {
        config.streaming.policy = policy
            .parse::<StreamingPolicyKind>()
            .map_err(|message| ConfigError::Env {
                var: ENV_STREAMING_POLICY,
                message,
            })?;
    }

    if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
        config.upstream.max_connections = parse_number(ENV_MAX_CONNECTIONS, &raw)?;
    }
    if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
        config.timeouts.request_secs = parse_number(ENV_REQUEST_TIMEOUT_SECS, &raw)?;
    }

    let Some(targets) = lookup(ENV_TARGET_URLS) else {
        return Ok(());
    };
    let targets = split_list(&targets);

    let ports = lookup(ENV_SERVER_PORTS).ok_or(ConfigError::Env {
        var: ENV_SERVER_PORTS,
        message: format!("required when {ENV_TARGET_URLS} is set"),
    })?;
    let ports = split_list(&ports)
        .into_iter()
        .map(|p| parse_number::<u16>(ENV_SERVER_PORTS, &p))
        .collect::<Result<Vec<_>, _>>()?;

    if ports.len() != targets.len() {
        return Err(ConfigError::Env {
            var: ENV_SERVER_PORTS,
            message: format!(
                "{} entries but {ENV_TARGET_URLS} has {}",
                ports.len(),
                targets.len()
            ),
        });
    }

    let publics: Vec<Option<String>> = match lookup(ENV_SERVER_URLS) {
        Some(raw) => {
            let publics = split_list(&raw);
            if publics.len() != targets.len() {
                return Err(ConfigError::Env {
                    var: ENV_SERVER_URLS,
                    message: format!(
                        "{} entries but {ENV_TARGET_URLS} has {}",
                        publics.len(),
                        targets.len()
                    ),
                });
            }
            publics
                .into_iter()
                .map(|p| if p.is_empty() { None } else { Some(p) })
                .collect()
        }
        None => vec![None; targets.len()],
    };

    config.routes = targets
        .into_iter()
        .zip(ports)
        .zip(publics)
        .map(|((upstream, listen_port), public_url)| RouteConfig {
            listen_port,
            upstream: upstream.trim_end_matches('/').to_string(),
            public_url,
        })
        .collect();

    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Env {
        var,
        message: format!("{raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn assembles_routes_positionally() {
        let mut config = ProxyConfig::default();
        apply_env(
            &mut config,
            env(&[
                (ENV_TARGET_URLS, "http://a.internal/, http://b.internal"),
                (ENV_SERVER_PORTS, "8080,8081"),
                (ENV_SERVER_URLS, "https://a.public,"),
                (ENV_PROXY_URL, "http://127.0.0.1:3128"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.routes,
            vec![
                RouteConfig {
                    listen_port: 8080,
                    upstream: "http://a.internal".into(),
                    public_url: Some("https://a.public".into()),
                },
                RouteConfig {
                    listen_port: 8081,
                    upstream: "http://b.internal".into(),
                    public_url: None,
                },
            ]
        );
        assert_eq!(config.upstream.proxy_url.as_deref(), Some("http://127.0.0.1:3128"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_misaligned_lists() {
        let mut config = ProxyConfig::default();
        let err = apply_env(
            &mut config,
            env(&[
                (ENV_TARGET_URLS, "http://a,http://b"),
                (ENV_SERVER_PORTS, "8080"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_SERVER_PORTS, .. }));

        let err = apply_env(
            &mut config,
            env(&[
                (ENV_TARGET_URLS, "http://a"),
                (ENV_SERVER_PORTS, "8080"),
                (ENV_SERVER_URLS, "https://x,https://y"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_SERVER_URLS, .. }));
    }

    #[test]
    fn rejects_bad_port() {
        let mut config = ProxyConfig::default();
        let err = apply_env(
            &mut config,
            env(&[(ENV_TARGET_URLS, "http://a"), (ENV_SERVER_PORTS, "eighty")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ENV_SERVER_PORTS));
    }

    #[test]
    fn overrides_tuning_values() {
        let mut config = ProxyConfig::default();
        apply_env(
            &mut config,
            env(&[
                (ENV_STREAMING_POLICY, "request"),
                (ENV_MAX_CONNECTIONS, "12"),
                (ENV_REQUEST_TIMEOUT_SECS, "9"),
            ]),
        )
        .unwrap();
        assert_eq!(config.streaming.policy, StreamingPolicyKind::RequestDeclared);
        assert_eq!(config.upstream.max_connections, 12);
        assert_eq!(config.timeouts.request_secs, 9);
        assert!(config.routes.is_empty());
    }
}
