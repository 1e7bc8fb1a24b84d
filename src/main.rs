//! Skirmish Match Server
//!
//! Binary entry point: reads configuration from the environment and runs
//! the WebSocket server until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skirmish::{
    network::{AuthConfig, GameServer, ServerConfig},
    VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let auth = AuthConfig::from_env().context("invalid auth configuration")?;

    info!("Skirmish Server v{}", VERSION);
    info!(
        "Max connections: {}, reaper every {:?}",
        config.max_connections, config.reaper_interval
    );

    let server = Arc::new(GameServer::new(config, auth));
    let runner = server.clone();
    let mut server_task = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = &mut server_task => {
            result.context("server task panicked")??;
            info!("Server stopped");
            return Ok(());
        }
        _ = signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    server.shutdown();
    server_task
        .await
        .context("server task panicked")?
        .context("server error during shutdown")?;

    info!("Shutdown complete");
    Ok(())
}
