//! Admin and observability endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use plank_relay::SessionInfo;
use serde_json::json;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /sessions` — snapshot of all subscriber sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.list())
}

/// `DELETE /sessions/{id}` — force-disconnect one session.
#[instrument(skip_all, fields(session_id = %id))]
pub async fn disconnect_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.disconnect(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /healthz` — liveness plus a cheap store probe.
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let head = state.store.head_seq()?;
    Ok(Json(json!({ "status": "ok", "change_log_head": head })))
}

/// `GET /metrics` — Prometheus exposition.
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus.render()
}
