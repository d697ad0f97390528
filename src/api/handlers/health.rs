//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::api::server::AppState;

/// Liveness check; never touches the network
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339(),
            "message": "framegate proxy server is running",
            "port": state.config.server.port,
            "uptime_secs": state.started_at.elapsed().as_secs(),
        })),
    )
}
