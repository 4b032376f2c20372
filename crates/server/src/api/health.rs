use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub queue: bool,
}

/// `GET /health` — liveness plus backend connectivity flags. Always 200;
/// the flags tell the caller what is degraded.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.store.health_check().await.is_ok();
    let queue = state
        .queue
        .health_check()
        .await
        .map(|h| h.connected)
        .unwrap_or(false);
    Json(HealthResponse {
        status: if database && queue { "ok" } else { "degraded" },
        database,
        queue,
    })
}
