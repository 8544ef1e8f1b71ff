//! Model-level error types.

use thiserror::Error;

use crate::catalog::KeypointId;
use crate::person::PersonId;

/// Result type for parsing model values.
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type for validated store operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised while parsing model values from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid frame key: {0}")]
    InvalidFrameKey(String),
}

/// Rejected store operations. The store is left unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Person name cannot be empty")]
    EmptyName,

    #[error("Person name cannot exceed {max} characters")]
    NameTooLong { max: usize },

    #[error("Person name may only contain letters, digits, spaces, '_' and '-'")]
    InvalidNameCharacters,

    #[error("A person named \"{0}\" already exists")]
    DuplicateName(String),

    #[error("Person limit of {0} reached")]
    TooManyPersons(usize),

    #[error("Unknown person: {0}")]
    UnknownPerson(PersonId),

    #[error("Unknown keypoint id: {0}")]
    UnknownKeypoint(KeypointId),

    #[error("Position ({x}, {y}) lies outside the {width}x{height} frame")]
    OutOfBounds {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },

    #[error("No {0} selected")]
    MissingSelection(&'static str),

    #[error("Frame {frame} is outside the video (0..{total})")]
    FrameOutOfRange { frame: u64, total: u64 },
}

impl ValidationError {
    /// Create a missing-selection error.
    pub fn missing_selection(what: &'static str) -> Self {
        Self::MissingSelection(what)
    }
}
