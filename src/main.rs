//! Crashline Game Server
//!
//! Authoritative WebSocket server for the crash betting game.

use tracing::info;
use tracing_subscriber::EnvFilter;

use crashline::network::server::{GameServer, ServerConfig};
use crashline::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    info!("Crashline Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Max connections: {}", config.max_connections);
    info!(
        "Guest play: {}",
        if config.auth.allow_guests {
            "enabled"
        } else {
            "disabled"
        }
    );

    let server = GameServer::new(config);
    server.run().await?;

    Ok(())
}
