//! Reverse-proxy / page-aggregation gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────┐
//!                        │                    GATEWAY                     │
//!                        │                                                │
//!     Client Request     │  ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//!     ───────────────────┼─▶│  http   │──▶│ registry │──▶│   driver   │  │
//!                        │  │ server  │   │  router  │   │ (rewrite)  │  │
//!                        │  └─────────┘   └──────────┘   └─────┬──────┘  │
//!                        │                                     │         │
//!                        │                                     ▼         │
//!     Client Response    │  ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//!     ◀──────────────────┼──│  tags   │◀──│ response │◀──│   pooled   │◀─┼── Backend
//!                        │  │(blocks) │   │ rewrite  │   │   client   │  │
//!                        │  └─────────┘   └──────────┘   └────────────┘  │
//!                        │                                                │
//!                        │  config (flat properties, hot reload)          │
//!                        │  observability (tracing, metrics)              │
//!                        └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fragment_gateway::config::{self, watcher::ConfigWatcher};
use fragment_gateway::http::GatewayServer;
use fragment_gateway::observability::metrics;
use fragment_gateway::registry::DriverRegistry;

#[derive(Parser, Debug)]
#[command(name = "fragment-gateway", about = "Reverse-proxy page-aggregation gateway")]
struct Args {
    /// Path to the gateway configuration file (TOML). Falls back to the
    /// GATEWAY_CONFIG environment variable.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fragment_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fragment-gateway v0.1.0 starting");

    let args = Args::parse();
    let config_path = config::resolve_config_path(args.config.as_deref())?;
    let properties = config::load_properties(&config_path)?;

    let registry = Arc::new(DriverRegistry::new());
    registry.configure(&properties)?;

    // Metrics endpoint, when configured
    if let Some(metrics_address) = properties.get("metrics_address") {
        match metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload: rebuild the registry whenever the file changes
    let (watcher, mut reload_rx) = ConfigWatcher::new(&config_path);
    let _watcher_handle = watcher.run()?;
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            while let Some(properties) = reload_rx.recv().await {
                match registry.configure(&properties) {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::error!(
                        "Failed to apply reloaded config: {}. Keeping current configuration.",
                        e
                    ),
                }
            }
        });
    }

    let server = GatewayServer::new(registry, &properties)?;
    let listener = TcpListener::bind(server.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
