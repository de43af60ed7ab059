//! Route lookup by listening port.
//!
//! # Responsibilities
//! - Store one compiled route per listening port
//! - Resolve the route for the port a connection was accepted on
//! - Build upstream target URLs for a request path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) port lookup via HashMap
//! - Unknown port is an explicit error, never a silent default

use std::collections::HashMap;

use url::Url;

use crate::config::{ConfigError, RouteConfig, ValidationError};

/// A compiled route: one listening port forwarding to one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Port the route's listener is bound on.
    pub listen_port: u16,
    /// Upstream base URL, no trailing slash.
    pub upstream: String,
    /// Public URL substituted for `upstream` in rewritten bodies.
    pub public_url: Option<String>,
    /// Network authority of the upstream, used as the outbound `Host`.
    pub authority: String,
}

impl Route {
    /// Compile a route from configuration.
    pub fn from_config(index: usize, config: &RouteConfig) -> Result<Self, ConfigError> {
        let invalid = || {
            ConfigError::Validation(vec![ValidationError::InvalidUpstream {
                index,
                url: config.upstream.clone(),
            }])
        };
        let url = Url::parse(&config.upstream).map_err(|_| invalid())?;
        let host = url.host_str().ok_or_else(invalid)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            listen_port: config.listen_port,
            upstream: config.upstream.trim_end_matches('/').to_string(),
            public_url: config.public_url.clone(),
            authority,
        })
    }

    /// Target URL for a relative path (with optional query), joined with
    /// exactly one slash.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}/{}", self.upstream, path_and_query.trim_start_matches('/'))
    }
}

/// Immutable port → route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<u16, Route>,
    ports: Vec<u16>,
}

impl RouteTable {
    /// Compile all configured routes, preserving configuration order.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for (index, config) in configs.iter().enumerate() {
            let route = Route::from_config(index, config)?;
            if table.routes.contains_key(&route.listen_port) {
                return Err(ConfigError::Validation(vec![ValidationError::DuplicatePort(
                    route.listen_port,
                )]));
            }
            table.ports.push(route.listen_port);
            table.routes.insert(route.listen_port, route);
        }
        Ok(table)
    }

    /// Resolve the route registered for `port`.
    pub fn resolve(&self, port: u16) -> Result<&Route, ConfigError> {
        self.routes.get(&port).ok_or(ConfigError::UnknownPort(port))
    }

    /// Routes in configuration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.ports.iter().filter_map(|port| self.routes.get(port))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16, upstream: &str, public: Option<&str>) -> RouteConfig {
        RouteConfig {
            listen_port: port,
            upstream: upstream.to_string(),
            public_url: public.map(str::to_string),
        }
    }

    #[test]
    fn resolves_each_port_to_its_own_route() {
        let table = RouteTable::from_config(&[
            config(8080, "http://api.internal", Some("https://api.public")),
            config(8081, "http://10.0.0.2:9000", None),
        ])
        .unwrap();

        let first = table.resolve(8080).unwrap();
        assert_eq!(first.upstream, "http://api.internal");
        assert_eq!(first.authority, "api.internal");
        assert_eq!(first.public_url.as_deref(), Some("https://api.public"));

        let second = table.resolve(8081).unwrap();
        assert_eq!(second.authority, "10.0.0.2:9000");
        assert!(second.public_url.is_none());

        assert!(matches!(table.resolve(9999), Err(ConfigError::UnknownPort(9999))));
        assert_eq!(table.routes().map(|r| r.listen_port).collect::<Vec<_>>(), vec![8080, 8081]);
    }

    #[test]
    fn joins_target_without_double_slash() {
        let table = RouteTable::from_config(&[config(8080, "http://api.internal", None)]).unwrap();
        let route = table.resolve(8080).unwrap();
        assert_eq!(route.target_url("/v1/items"), "http://api.internal/v1/items");
        assert_eq!(route.target_url("v1/items?x=1"), "http://api.internal/v1/items?x=1");
        assert_eq!(route.target_url("/"), "http://api.internal/");
    }

    #[test]
    fn rejects_duplicate_ports() {
        let err = RouteTable::from_config(&[
            config(8080, "http://a", None),
            config(8080, "http://b", None),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
