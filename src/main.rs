//! Latency-aware JSON-RPC load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    LOAD BALANCER                     │
//!   Client Request   │  ┌───────────┐   ┌───────────┐   ┌──────────────┐    │
//!   ─────────────────┼─▶│ admission │──▶│  backend  │──▶│  dispatcher  │────┼──▶ Backend
//!                    │  │ (limiter) │   │   pool    │   │ (hyper proxy)│    │
//!                    │  └───────────┘   └─────┬─────┘   └──────┬───────┘    │
//!   Client Response  │                        │ HGETALL        │ HSET       │
//!   ◀────────────────┼────────────────────────┼────────────────┘            │
//!                    │                        ▼                             │
//!                    │              ┌───────────────────┐                   │
//!                    │              │ shared latency    │◀── other          │
//!                    │              │ store (Redis hash)│    instances      │
//!                    │              └───────────────────┘                   │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use latency_balancer::config::{load_config, BalancerConfig};
use latency_balancer::lifecycle::{bootstrap, Shutdown, StartupError};
use latency_balancer::observability::{logging, metrics};
use latency_balancer::HttpServer;

#[derive(Parser)]
#[command(name = "latency-balancer")]
#[command(about = "Latency-aware JSON-RPC load balancer", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path).map_err(StartupError::Config)?,
        None => BalancerConfig::default(),
    };

    logging::init(&config.observability.log_level);

    if cli.check {
        println!("configuration ok");
        return Ok(());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        store = ?config.store.kind,
        rate_limit = config.rate_limit.enabled,
        "latency-balancer v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = bootstrap(&config).await?;

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(StartupError::Bind)?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::new(config, services);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
