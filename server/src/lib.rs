//! Tandem relay
//!
//! Relays text messages between pairs of identities over WebSocket, keeps
//! every conversation in memory and replays it when a party (re)connects.

pub mod config;
pub mod registry;
pub mod routing;
pub mod store;
pub mod websocket;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use config::ServerConfig;
pub use registry::{ConnectionHandle, ConnectionRegistry, Delivery};
pub use store::ConversationStore;
pub use websocket::ServerState;

/// Serve the relay on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<ServerState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = routing::create_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
