//! Inference run handlers.

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use posemark_models::api::{AckResponse, ContinueRequest, NextResponse, StartRequest};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Start a run for an existing video, replacing any active run.
pub async fn start_inference(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<Json<AckResponse>> {
    if request.video_path.trim().is_empty() {
        return Err(ApiError::bad_request("videoPath is required"));
    }
    let video_path = PathBuf::from(request.video_path.trim());
    if !tokio::fs::try_exists(&video_path).await.unwrap_or(false) {
        return Err(ApiError::not_found(format!("Video not found: {}", video_path.display())));
    }

    let run_id = state.runner.start(&video_path).await?;
    info!(run_id = %run_id, video_path = %video_path.display(), "Inference started");

    Ok(Json(AckResponse::ok("Inference started")))
}

/// Wait for the next result of the active run.
pub async fn next_result(State(state): State<AppState>) -> ApiResult<Json<NextResponse>> {
    let response = match state.runner.next(state.config.next_timeout).await? {
        Some(result) => NextResponse::result(result),
        None => NextResponse::timeout(),
    };
    Ok(Json(response))
}

/// Forward the corrected annotations of a frame and let the run continue.
pub async fn continue_inference(
    State(state): State<AppState>,
    Json(request): Json<ContinueRequest>,
) -> ApiResult<Json<AckResponse>> {
    state.runner.send_corrections(&request).await?;
    Ok(Json(AckResponse::ok(format!(
        "Corrections for frame {} received",
        request.frame_number
    ))))
}

/// Stop the active run, if any.
pub async fn stop_inference(State(state): State<AppState>) -> Json<AckResponse> {
    if state.runner.stop().await {
        Json(AckResponse::ok("Inference stopped"))
    } else {
        Json(AckResponse::ok("No inference running"))
    }
}
