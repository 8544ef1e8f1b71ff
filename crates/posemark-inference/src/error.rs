//! Inference client error types.

use thiserror::Error;

pub type ClientResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference backend unreachable: {0}")]
    Unreachable(String),

    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Inference run failed: {0}")]
    Backend(String),

    #[error("No result after {0} seconds")]
    Timeout(u64),

    #[error("Inference session cancelled")]
    Cancelled,

    #[error("Inference session already finished")]
    SessionClosed,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InferenceError {
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Unreachable(_) => true,
            InferenceError::RequestFailed { status, .. } => *status >= 500,
            InferenceError::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
