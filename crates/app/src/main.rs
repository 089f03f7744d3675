//! Skulk - hidden-role game room server
//!
//! Hosts lobbies, task rounds and meetings for any number of rooms over a
//! single TCP listener.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skulk_core::RoomStore;
use skulk_net::Server;

mod config;

use config::ServerConfig;

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Skulk");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

/// Run until interrupted
async fn serve(config: ServerConfig) -> skulk_net::Result<()> {
    let store = RoomStore::with_rules(config.rules);
    let server = Server::start(config.port, store, config.max_connections).await?;

    tracing::info!(addr = %server.addr(), "Listening");

    tokio::signal::ctrl_c().await?;

    tracing::info!(status = ?server.status().await, "Shutting down");
    server.shutdown();
    // Give connections a moment to deliver the shutdown notice
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
