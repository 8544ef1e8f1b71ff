//! Health check handler.

use axum::Json;
use posemark_models::api::HealthResponse;

/// Liveness check, polled by clients before starting a session.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
