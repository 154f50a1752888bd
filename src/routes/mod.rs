// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::monitor::SlowQueryMonitor;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) monitor: Arc<SlowQueryMonitor>,
    pub(crate) config: AppConfig,
}

pub fn app(monitor: Arc<SlowQueryMonitor>, config: AppConfig) -> Router {
    let state = AppState { monitor, config };
    Router::new()
        .route("/", get(|| async { "slowquery-monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/status", get(http::status_handler)) // GET /api/status
        .route(
            "/api/view",
            get(http::view_state_handler).patch(http::update_view_handler),
        ) // GET, PATCH /api/view
        .route("/api/queries", get(http::queries_handler)) // GET /api/queries
        .route("/api/charts", get(http::charts_handler)) // GET /api/charts
        .route("/api/refresh", post(http::refresh_handler)) // POST /api/refresh?force=
        .route("/api/reset", post(http::reset_handler)) // POST /api/reset
        .route("/api/auto-refresh", post(http::auto_refresh_handler)) // POST /api/auto-refresh
        .route("/api/export", get(http::export_handler)) // GET /api/export?format=
        .route("/ws/events", get(ws::ws_events)) // WS /ws/events
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
