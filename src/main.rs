use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use rewrite_proxy::config;
use rewrite_proxy::lifecycle::{signals, Shutdown};
use rewrite_proxy::observability::{logging, metrics};
use rewrite_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "rewrite-proxy")]
#[command(about = "Port-routed reverse proxy with response URL rewriting", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = config::load(cli.config.as_deref()).context("invalid configuration")?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rewrite-proxy starting");
    tracing::info!(
        routes = config.routes.len(),
        streaming_policy = ?config.streaming.policy,
        forward_proxy = config.upstream.proxy_url.as_deref().unwrap_or("none"),
        max_connections = config.upstream.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .with_context(|| format!("invalid metrics address {}", config.observability.metrics_address))?;
        metrics::init_metrics(addr);
    }

    let server = HttpServer::new(&config).context("failed to build forwarding engine")?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::watch(shutdown.clone()));

    server.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
