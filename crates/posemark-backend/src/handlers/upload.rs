//! Video upload handler.

use axum::extract::{Multipart, State};
use axum::Json;
use posemark_models::api::UploadResponse;
use posemark_models::video::is_video_file;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
const VIDEO_FIELD: &str = "video";

/// Store an uploaded video under a generated name.
pub async fn upload_video(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if !is_video_file(&original) {
            warn!(file_name = %original, "Rejected upload with unsupported extension");
            return Err(ApiError::bad_request(format!("Unsupported video file: {}", original)));
        }
        let ext = original
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        tokio::fs::create_dir_all(&state.config.upload_dir).await?;
        let path = state.config.upload_dir.join(format!("{}.{}", Uuid::new_v4(), ext));

        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0u64;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(ApiError::bad_request(format!("Upload interrupted: {}", e)));
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        metrics::record_upload(written);
        info!(file_name = %original, path = %path.display(), bytes = written, "Video uploaded");

        return Ok(Json(UploadResponse {
            success: true,
            file_path: path.display().to_string(),
        }));
    }

    Err(ApiError::bad_request("No video file provided"))
}
