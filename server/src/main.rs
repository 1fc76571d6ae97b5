use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use tandem_server::{ServerConfig, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tandem_server=debug".parse()?)
                .add_directive("axum=info".parse()?),
        )
        .init();

    info!("Starting Tandem relay");

    let config = ServerConfig::from_env()?;
    info!("Configuration loaded");

    let addr = config.bind_addr();
    let state = Arc::new(ServerState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Relay listening on http://{}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://{}/ws", listener.local_addr()?);

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received, draining connections...");
    };

    tandem_server::serve(listener, state, shutdown_signal).await?;

    info!("Relay stopped cleanly");
    Ok(())
}
