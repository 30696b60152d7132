//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::AirwaveResult;
use crate::protocol_constants::SERVICE_ID;
use crate::services::ModeRequest;
use crate::types::{PlaylistId, TrackId};

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModeBody {
    mode: String,
    playlist_id: Option<PlaylistId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentTrackBody {
    track_id: TrackId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/mode", post(set_mode))
        .route("/api/autodj/skip", post(skip_track))
        .route("/api/current-track", post(set_current_track))
        .route("/api/playlists/{id}/changed", post(playlist_changed))
        .route("/api/stats", get(get_stats))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: "Is the process running?"
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "connections": state.ws_manager.connection_count(),
    }))
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.machine.status())
}

/// Idempotent mode switch. Repeating the current mode is not an error.
async fn set_mode(
    State(state): State<AppState>,
    Json(body): Json<ModeBody>,
) -> AirwaveResult<impl IntoResponse> {
    let request = ModeRequest::parse(&body.mode, body.playlist_id)?;
    let changed = state.machine.apply_mode(request)?;
    Ok(api_success(json!({
        "changed": changed,
        "status": state.machine.status(),
    })))
}

/// A skip that selects nothing reports why as the error code.
async fn skip_track(State(state): State<AppState>) -> AirwaveResult<impl IntoResponse> {
    let track = state.machine.skip().await?;
    Ok(api_success(json!({ "track": track })))
}

async fn set_current_track(
    State(state): State<AppState>,
    Json(body): Json<CurrentTrackBody>,
) -> AirwaveResult<impl IntoResponse> {
    let track = state.machine.set_current_track(body.track_id).await?;
    Ok(api_success(json!({ "track": track })))
}

async fn playlist_changed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let resumed = state.machine.playlist_changed(PlaylistId(id));
    if resumed {
        api_success(json!({ "success": true, "resumed": true })).into_response()
    } else {
        api_ok().into_response()
    }
}

/// Latest snapshot plus recent history, newest first.
async fn get_stats(State(state): State<AppState>) -> AirwaveResult<impl IntoResponse> {
    let limit = state.config.read().history_limit;
    let latest = state.store.latest_snapshot().await?;
    let history = state.store.snapshot_history(limit).await?;
    Ok(api_success(json!({
        "latest": latest,
        "history": history,
    })))
}
