//! Annotator error types.

use posemark_inference::InferenceError;
use posemark_media::MediaError;
use posemark_models::ValidationError;
use thiserror::Error;

pub type AnnotatorResult<T> = Result<T, AnnotatorError>;

#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Import/export error: {0}")]
    ExportImport(#[from] ExportImportError),

    #[error("No video loaded")]
    NoVideo,

    #[error("No inference session running")]
    NoSession,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnnotatorError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Failures reading or writing export documents. Imports that fail leave
/// the store untouched.
#[derive(Debug, Error)]
pub enum ExportImportError {
    #[error("Malformed export file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Export file is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Unsupported export version {0}")]
    UnsupportedVersion(String),

    #[error("Person \"{key}\" has no usable name: {reason}")]
    InvalidName {
        key: String,
        #[source]
        reason: ValidationError,
    },

    #[error("Unknown keypoint name \"{0}\"")]
    UnknownKeypoint(String),

    #[error("Invalid position for {keypoint} of {person} on {frame}")]
    InvalidPosition {
        frame: String,
        person: String,
        keypoint: String,
    },
}
