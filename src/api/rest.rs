// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/` and are read-only views of the signal
// store, except `POST /api/v1/visibility` which pauses or resumes the
// refresh loop. There is no authentication: the service is meant to sit
// behind the consuming app on a trusted host.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;
use crate::fetch::Connectivity;
use crate::notices::NoticeKind;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/signals/:asset", get(signal_for_asset))
        .route("/api/v1/notices", get(notices))
        .route("/api/v1/visibility", post(set_visibility))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    /// `warming_up` until the first signal lands.
    status: &'static str,
    online: bool,
    visible: bool,
    signals: usize,
    rate_limited_notices: usize,
    store_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: if state.signal_store.is_empty() { "warming_up" } else { "ok" },
        online: state.network.is_online(),
        visible: state.is_visible(),
        signals: state.signal_store.len(),
        rate_limited_notices: state.notices.count(NoticeKind::RateLimited),
        store_version: state.signal_store.version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Signals
// =============================================================================

async fn signals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.signal_store.all())
}

async fn signal_for_asset(
    State(state): State<Arc<AppState>>,
    Path(asset): Path<String>,
) -> impl IntoResponse {
    match state.signal_store.get(&asset.to_lowercase()) {
        Some(signal) => Json(signal).into_response(),
        None => {
            let body = serde_json::json!({
                "error": "no signal for asset",
                "asset": asset,
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Notices
// =============================================================================

async fn notices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.notices.recent())
}

// =============================================================================
// Visibility
// =============================================================================

#[derive(Deserialize)]
struct VisibilityUpdate {
    visible: bool,
}

async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Json(update): Json<VisibilityUpdate>,
) -> impl IntoResponse {
    let was = state.is_visible();
    state.set_visible(update.visible);
    if was != update.visible {
        info!(visible = update.visible, "consumer visibility changed");
    }
    Json(serde_json::json!({ "visible": update.visible }))
}
