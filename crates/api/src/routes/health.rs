use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Live WebSocket connections.
    pub connections: usize,
}

/// GET /health -- returns service health and the live connection count.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.hub.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.total_connection_count().await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
