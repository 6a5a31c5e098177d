// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::broadcaster::Broadcaster;
use crate::config::AppConfig;
use crate::monitor::MonitorReader;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) reader: MonitorReader,
    pub(crate) broadcaster: Arc<Broadcaster>,
}

pub fn app(reader: MonitorReader, broadcaster: Arc<Broadcaster>, config: &AppConfig) -> Router {
    let state = AppState {
        reader,
        broadcaster,
    };
    Router::new()
        .route("/", get(http::root_handler)) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/health", get(http::health_handler)) // GET /health
        .route("/api/connections", get(http::connections_handler)) // GET /api/connections
        .route("/api/stats", get(http::stats_handler)) // GET /api/stats
        .route("/api/bandwidth-history", get(http::history_handler)) // GET /api/bandwidth-history
        .route("/ws", get(ws::ws_updates)) // WS /ws
        .layer(cors_layer(config))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_allows_any() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(config.cors_header_values())
    }
}
