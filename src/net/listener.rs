//! One TCP listener per route port.
//!
//! # Responsibilities
//! - Bind every configured route port on the configured host
//! - Serve the shared router on each listener concurrently
//! - Expose the accepted connection's local address to handlers
//! - Stop every listener on one shutdown trigger
//!
//! # Design Decisions
//! - Binding is all-or-nothing: any bind failure aborts startup
//! - The route is chosen from the socket's local port, never from headers
//! - Accept loops never wait on the upstream pool

use std::net::SocketAddr;

use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::lifecycle::Shutdown;
use crate::routing::RouteTable;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("listener on port {port} failed: {source}")]
    Serve {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("listener task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Addresses of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAddrs {
    /// Local socket address the connection was accepted on.
    pub local: Option<SocketAddr>,
    pub peer: SocketAddr,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionAddrs {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self {
            local: stream.io().local_addr().ok(),
            peer: *stream.remote_addr(),
        }
    }
}

/// The bound listeners, one per route.
#[derive(Debug)]
pub struct ListenerSet {
    listeners: Vec<TcpListener>,
}

impl ListenerSet {
    /// Bind `host:port` for every route in `routes`.
    ///
    /// `host` may be a name, an IPv4 address, or an IPv6 address with or
    /// without brackets.
    pub async fn bind(host: &str, routes: &RouteTable) -> Result<Self, ListenerError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let mut listeners = Vec::with_capacity(routes.len());
        for route in routes.routes() {
            let addr = display_addr(host, route.listen_port);
            let listener = TcpListener::bind((host, route.listen_port))
                .await
                .map_err(|source| ListenerError::Bind { addr: addr.clone(), source })?;

            tracing::info!(
                address = %addr,
                upstream = %route.upstream,
                public_url = route.public_url.as_deref().unwrap_or("-"),
                "Listener bound"
            );
            listeners.push(listener);
        }
        Ok(Self { listeners })
    }

    /// Use listeners that are already bound.
    pub fn from_listeners(listeners: Vec<TcpListener>) -> Self {
        Self { listeners }
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Serve `router` on every listener until `shutdown` triggers.
    ///
    /// Returns after every listener has drained; the first listener
    /// failure stops the others.
    pub async fn serve(self, router: Router, shutdown: Shutdown) -> Result<(), ListenerError> {
        let mut tasks = JoinSet::new();

        for listener in self.listeners {
            let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
            let app = router
                .clone()
                .into_make_service_with_connect_info::<ConnectionAddrs>();
            let stop = shutdown.wait();

            tasks.spawn(async move {
                tracing::info!(port, "Listener accepting connections");
                axum::serve(listener, app)
                    .with_graceful_shutdown(stop)
                    .await
                    .map_err(|source| ListenerError::Serve { port, source })?;
                tracing::info!(port, "Listener stopped");
                Ok::<(), ListenerError>(())
            });
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(ListenerError::from).and_then(|r| r);
            if let Err(e) = outcome {
                tracing::error!(error = %e, "Listener failed, stopping the rest");
                shutdown.trigger();
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// `host:port`, bracketing IPv6 hosts.
fn display_addr(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let routes = RouteTable::from_config(&[RouteConfig {
            listen_port: port,
            upstream: "http://127.0.0.1:9".into(),
            public_url: None,
        }])
        .unwrap();

        let err = ListenerSet::bind("127.0.0.1", &routes).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { ref addr, .. } if addr.ends_with(&port.to_string())));
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        assert_eq!(display_addr("::", 8080), "[::]:8080");
        assert_eq!(display_addr("0.0.0.0", 8080), "0.0.0.0:8080");
        assert_eq!(display_addr("localhost", 80), "localhost:80");
    }

    #[tokio::test]
    async fn binds_ipv6_hosts() {
        // Hosts without IPv6 loopback cannot run this.
        let Ok(free) = std::net::TcpListener::bind("[::1]:0") else {
            return;
        };
        let port = free.local_addr().unwrap().port();
        drop(free);
        let routes = RouteTable::from_config(&[RouteConfig {
            listen_port: port,
            upstream: "http://127.0.0.1:9".into(),
            public_url: None,
        }])
        .unwrap();

        for host in ["::1", "[::1]"] {
            let set = ListenerSet::bind(host, &routes).await.unwrap();
            let addrs = set.local_addrs();
            assert_eq!(addrs.len(), 1);
            assert!(addrs[0].is_ipv6());
            assert_eq!(addrs[0].port(), port);
        }
    }

    #[tokio::test]
    async fn shutdown_stops_every_listener() {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let set = ListenerSet::from_listeners(vec![a, b]);
        assert_eq!(set.local_addrs().len(), 2);

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(set.serve(Router::new(), shutdown.clone()));
        while shutdown.receiver_count() < 2 {
            tokio::task::yield_now().await;
        }
        shutdown.trigger();

        handle.await.unwrap().unwrap();
    }
}
