//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while loading media or extracting frames.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Failed to load media: {0}")]
    MediaLoad(String),

    #[error("Invalid media metadata after {attempts} attempt(s): {reason}")]
    MetadataInvalid { attempts: u32, reason: String },

    #[error("Seek did not complete within {0} ms")]
    SeekTimeout(u64),

    #[error("Frame {frame} is outside the video (0..{total})")]
    FrameOutOfRange { frame: u64, total: u64 },

    #[error("Invalid crop bounds: {0}")]
    InvalidCrop(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MediaError {
    /// Create a media load error.
    pub fn media_load(message: impl Into<String>) -> Self {
        Self::MediaLoad(message.into())
    }

    /// Create an invalid metadata error for a single attempt.
    pub fn metadata_invalid(reason: impl Into<String>) -> Self {
        Self::MetadataInvalid {
            attempts: 1,
            reason: reason.into(),
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Whether reloading the source may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::MediaLoad(_)
                | MediaError::MetadataInvalid { .. }
                | MediaError::FfprobeFailed { .. }
                | MediaError::JsonParse(_)
                | MediaError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(MediaError::media_load("eof").is_retryable());
        assert!(MediaError::metadata_invalid("zero width").is_retryable());
        assert!(!MediaError::FfprobeNotFound.is_retryable());
        assert!(!MediaError::Cancelled.is_retryable());
    }
}
