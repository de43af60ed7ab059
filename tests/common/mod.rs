//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use rewrite_proxy::config::{ProxyConfig, RouteConfig};
use rewrite_proxy::net::ListenerSet;
use rewrite_proxy::{HttpServer, Shutdown};

/// A request as received by a mock upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case(name)).count()
    }
}

/// What a mock upstream answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A complete response with `Content-Length`.
    Fixed {
        status: &'static str,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    },
    /// A chunked response: the first chunk, then `gate`, then the rest.
    Chunked {
        headers: Vec<(&'static str, String)>,
        first: Vec<u8>,
        rest: Vec<Vec<u8>>,
        gate: Arc<Notify>,
    },
    /// A chunked response that closes partway through its second chunk.
    Truncated {
        headers: Vec<(&'static str, String)>,
        first: Vec<u8>,
    },
}

impl Reply {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Reply::Fixed {
            status: "200 OK",
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
        }
    }
}

/// A running raw-TCP upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<Recorded>,
}

impl MockUpstream {
    /// Base URL of the upstream, no trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Next request the upstream received.
    pub async fn next_request(&mut self) -> Recorded {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("upstream saw no request")
            .expect("upstream stopped")
    }
}

/// Start a mock upstream answering every request with `reply`.
pub async fn start_upstream(reply: Reply) -> MockUpstream {
    start_upstream_with(|_| reply).await
}

/// Start a mock upstream whose reply is built from its own base URL.
pub async fn start_upstream_with(make: impl FnOnce(&str) -> Reply) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, requests) = mpsc::unbounded_channel();
    let reply = Arc::new(make(&format!("http://{addr}")));

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let reply = reply.clone();
            tokio::spawn(async move {
                handle_connection(socket, &reply, tx).await;
            });
        }
    });

    MockUpstream { addr, requests }
}

/// An address nothing listens on.
pub async fn refusing_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn handle_connection(mut socket: TcpStream, reply: &Reply, tx: mpsc::UnboundedSender<Recorded>) {
    let Some(recorded) = read_request(&mut socket).await else {
        return;
    };
    let _ = tx.send(recorded);

    match reply {
        Reply::Fixed { status, headers, body } => {
            let mut head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
        }
        Reply::Chunked { headers, first, rest, gate } => {
            let mut head = String::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n");
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = write_chunk(&mut socket, first).await;
            let _ = socket.flush().await;

            gate.notified().await;
            for chunk in rest {
                let _ = write_chunk(&mut socket, chunk).await;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        }
        Reply::Truncated { headers, first } => {
            let mut head = String::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n");
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = write_chunk(&mut socket, first).await;
            let _ = socket.write_all(b"40\r\npartial").await;
            let _ = socket.flush().await;
        }
    }
    let _ = socket.shutdown().await;
}

async fn write_chunk(socket: &mut TcpStream, chunk: &[u8]) -> std::io::Result<()> {
    socket.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
    socket.write_all(chunk).await?;
    socket.write_all(b"\r\n").await
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Recorded { request_line, headers, body })
}

/// A proxy serving on ephemeral local ports.
pub struct TestProxy {
    pub addrs: Vec<SocketAddr>,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestProxy {
    /// Base URL of the listener for the `index`-th route.
    pub fn url(&self, index: usize) -> String {
        format!("http://{}", self.addrs[index])
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Start a proxy with one listener per `(upstream, public_url)` pair.
pub async fn start_proxy(
    routes: Vec<(String, Option<String>)>,
    tweak: impl FnOnce(&mut ProxyConfig),
) -> TestProxy {
    let mut listeners = Vec::new();
    let mut route_configs = Vec::new();
    for (upstream, public_url) in routes {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        route_configs.push(RouteConfig {
            listen_port: listener.local_addr().unwrap().port(),
            upstream,
            public_url,
        });
        listeners.push(listener);
    }

    let mut config = ProxyConfig {
        routes: route_configs,
        ..ProxyConfig::default()
    };
    tweak(&mut config);

    let set = ListenerSet::from_listeners(listeners);
    let addrs = set.local_addrs();
    let server = HttpServer::new(&config).unwrap();
    let shutdown = Shutdown::new();
    let stop = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run_on(set, stop).await.unwrap();
    });

    TestProxy { addrs, shutdown, handle }
}

/// A client that talks to the proxy directly and never decodes bodies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn brotli(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        writer.write_all(data).unwrap();
    }
    out
}
