// GET handlers: service info, health, connections, stats, bandwidth history

use axum::{Json, extract::State, response::IntoResponse};

use super::AppState;
use crate::version::{DESCRIPTION, NAME, VERSION};

/// GET /: service name, version and status.
pub(super) async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
        "description": DESCRIPTION,
        "status": "running",
    }))
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /health: live WebSocket subscriber count and engine uptime.
pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "active_connections": state.broadcaster.subscriber_count(),
        "uptime": state.reader.uptime(),
    }))
}

/// GET /api/connections: connections as of the last tick.
pub(super) async fn connections_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.reader.connections();
    Json(serde_json::json!({
        "count": connections.len(),
        "connections": connections,
    }))
}

/// GET /api/stats
pub(super) async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.reader.stats())
}

/// GET /api/bandwidth-history: oldest to newest.
pub(super) async fn history_handler(State(state): State<AppState>) -> impl IntoResponse {
    let history = state.reader.history();
    Json(serde_json::json!({
        "count": history.len(),
        "history": history,
    }))
}
