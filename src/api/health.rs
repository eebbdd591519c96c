use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub media_gateway: String,
    pub active_rotations: usize,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_status = match state.rooms.health_check().await {
        Ok(true) => "connected",
        Ok(false) => "error",
        Err(_) => "disconnected",
    };

    let media_gateway_status = if state.media_gateway.is_healthy() {
        "ready"
    } else {
        "not_ready"
    };

    let overall_status = if store_status == "connected" && media_gateway_status == "ready" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: overall_status.to_string(),
        store: store_status.to_string(),
        media_gateway: media_gateway_status.to_string(),
        active_rotations: state.rotations.active_count(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
