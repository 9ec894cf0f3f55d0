use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::notifications::NotifierStats;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Which queue/store implementation is active.
    pub backend: &'static str,
    /// Whether the result store answered a ping.
    pub store_healthy: bool,
    /// Absent when the notifier task has stopped.
    pub notifier: Option<NotifierStats>,
}

/// GET /health -- returns service and result store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.results.ping().await.is_ok();
    let notifier = state.notifier.stats().await.ok();

    let status = if store_healthy && notifier.is_some() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        backend: state.config.backend.as_str(),
        store_healthy,
        notifier,
    })
}

/// Mount health check routes at the root level.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
