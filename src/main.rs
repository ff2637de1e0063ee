//! API gateway binary.
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!   Client Request   │                 API GATEWAY                  │
//!   ─────────────────┼─▶ rate limit ─▶ cache ─▶ route ─▶ balance ───┼──▶ Backend
//!                    │                                   │          │    Instance
//!   Client Response  │                          circuit breaker     │
//!   ◀────────────────┼──────── cache store ◀── retries / timeout ◀──┼─── 
//!                    │                                              │
//!                    │  health monitor · maintenance · admin API    │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_gateway::config::loader::load_config;
use api_gateway::config::watcher::ConfigWatcher;
use api_gateway::config::GatewayConfig;
use api_gateway::lifecycle::signals::spawn_signal_handler;
use api_gateway::observability::{logging::init_logging, metrics::init_metrics};
use api_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "api-gateway", version, about = "API gateway with rate limiting, caching and circuit breaking")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(
        name = %config.gateway.name,
        version = %config.gateway.version,
        "api-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server
    let (reloads, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (rx, Some(watcher.run()?))
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, reloads, shutdown.sender()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
