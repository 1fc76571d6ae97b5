//! HTTP routing configuration

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::websocket::ServerState;

/// Create the application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/ws", get(crate::websocket::handle_websocket))
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build CORS layer from config. Permissive when no origins are configured.
fn build_cors_layer(origins: &Option<String>) -> CorsLayer {
    match origins {
        Some(list) if !list.is_empty() => {
            let parsed: Vec<_> = list
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
        }
        _ => CorsLayer::permissive(),
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// Body of `GET /info`
#[derive(Debug, Serialize)]
pub struct RelayInfo {
    pub name: &'static str,
    pub protocol_version: u8,
    /// Open WebSocket connections, registered or not
    pub connections: usize,
    /// Registered identities
    pub online: usize,
    /// Conversations with at least one message
    pub conversations: usize,
}

async fn server_info(State(state): State<Arc<ServerState>>) -> Json<RelayInfo> {
    Json(RelayInfo {
        name: "Tandem Relay",
        protocol_version: tandem_shared::PROTOCOL_VERSION,
        connections: state.connection_count(),
        online: state.registry.len(),
        conversations: state.store.len(),
    })
}
