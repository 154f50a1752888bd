// REST handlers over the monitor facade

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::coordinator::{FetchError, RefreshOutcome};
use crate::export::ExportFormat;
use crate::models::ViewStatePatch;

/// GET /version: service name and version from Cargo.toml at build time.
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub(super) async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.status())
}

pub(super) async fn view_state_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.view_state())
}

pub(super) async fn update_view_handler(
    State(state): State<AppState>,
    Json(patch): Json<ViewStatePatch>,
) -> impl IntoResponse {
    Json(state.monitor.update_view(patch))
}

pub(super) async fn queries_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.page())
}

pub(super) async fn charts_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.charts())
}

#[derive(Deserialize)]
pub(super) struct RefreshParams {
    #[serde(default)]
    force: bool,
}

/// POST /api/refresh: rate limiting is not an error here; the cached status comes back with 200.
pub(super) async fn refresh_handler(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Response {
    match state.monitor.refresh(params.force).await {
        Ok(outcome) => refreshed(&state, &outcome),
        Err(e) => fetch_error(e),
    }
}

pub(super) async fn reset_handler(State(state): State<AppState>) -> Response {
    match state.monitor.reset().await {
        Ok(outcome) => refreshed(&state, &outcome),
        Err(e) => fetch_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct AutoRefreshBody {
    enabled: bool,
}

pub(super) async fn auto_refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<AutoRefreshBody>,
) -> Response {
    match state.monitor.enable_auto_refresh(body.enabled) {
        Ok(()) => Json(serde_json::json!({
            "autoRefreshActive": state.monitor.auto_refresh_active(),
            "intervalSecs": state.config.fetch.auto_refresh_interval_secs,
        }))
        .into_response(),
        Err(e) => fetch_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct ExportParams {
    format: Option<String>,
}

/// GET /api/export: attachment of the filtered, sorted rows of the stored view.
pub(super) async fn export_handler(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Response {
    let format = match params.format.as_deref().unwrap_or("csv").parse::<ExportFormat>() {
        Ok(f) => f,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    match state.monitor.export(format) {
        Ok(payload) => (
            [
                (header::CONTENT_TYPE, payload.mime_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", payload.filename),
                ),
            ],
            payload.content,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, operation = "export", "export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn refreshed(state: &AppState, outcome: &RefreshOutcome) -> Response {
    Json(serde_json::json!({
        "outcome": outcome.kind(),
        "status": state.monitor.status(),
    }))
    .into_response()
}

fn fetch_error(e: FetchError) -> Response {
    let (status, serving_cached) = match &e {
        FetchError::Backend { serving_cached, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, *serving_cached)
        }
        FetchError::Reset(_) => (StatusCode::BAD_GATEWAY, false),
        FetchError::Closed => (StatusCode::SERVICE_UNAVAILABLE, false),
    };
    (
        status,
        Json(serde_json::json!({
            "error": e.to_string(),
            "servingCached": serving_cached,
        })),
    )
        .into_response()
}
