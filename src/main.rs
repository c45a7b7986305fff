//! RPC gateway
//!
//! Serves an in-process dispatch table over JSON and XML-RPC.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                        GATEWAY                           │
//!                  │                                                          │
//!  JSON / XML-RPC  │  ┌─────────┐    ┌─────────┐    ┌──────────┐              │
//!  ────────────────┼─▶│  http   │───▶│  codec  │───▶│   rpc    │──▶ methods   │
//!                  │  │ server  │    │ strict/ │    │ dispatch │              │
//!                  │  └─────────┘    │  weak   │    └────┬─────┘              │
//!                  │                 └─────────┘         │ record stream      │
//!                  │                                     ▼                    │
//!  streamed body   │  ┌──────────┐   ┌──────────┐   ┌──────────┐             │
//!  ◀───────────────┼──│ response │◀──│  merge   │◀──│ receiver │             │
//!                  │  │  writer  │   │  engine  │──▶│  spills  │             │
//!                  │  └──────────┘   └──────────┘   └──────────┘             │
//!                  │                                                          │
//!                  │  config · observability · resilience · lifecycle         │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use rpc_gateway::config::load_or_default;
use rpc_gateway::lifecycle::signals::spawn_signal_listener;
use rpc_gateway::observability::{logging, metrics};
use rpc_gateway::services::demo;
use rpc_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "rpc-gateway")]
#[command(about = "JSON and XML-RPC gateway with stream merging", long_about = None)]
struct Args {
    /// TOML config file (falls back to $RPC_GATEWAY_CONFIG, then defaults).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config)?;

    logging::init(&config.observability);
    tracing::info!("rpc-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        merge_by_default = config.gateway.merge_by_default,
        default_timeout_secs = config.gateway.default_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config, Arc::new(demo::table()));
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
