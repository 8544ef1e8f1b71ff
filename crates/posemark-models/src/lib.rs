//! Shared data models for the Posemark keypoint annotator.
//!
//! This crate provides Serde-serializable types for:
//! - The keypoint catalog, skeleton graph and person palette
//! - Persons, positions and the frame -> person -> keypoint annotation map
//! - Video metadata and crop bounds
//! - Inference backend wire types and HTTP envelopes
//! - The portable export document

pub mod api;
pub mod annotations;
pub mod catalog;
pub mod color;
pub mod error;
pub mod export;
pub mod inference;
pub mod person;
pub mod selection;
pub mod video;

// Re-export common types
pub use annotations::{
    format_frame_key, parse_frame_key, AnnotationStats, Annotations, FrameAnnotations, FrameKey,
    PersonKeypoints, PersonStats, Position,
};
pub use catalog::{Keypoint, KeypointId, KEYPOINTS, PERSON_COLORS, SKELETON_CONNECTIONS};
pub use color::Rgb;
pub use error::{ModelError, ModelResult, ValidationError, ValidationResult};
pub use export::{ExportDocument, ExportedPerson, EXPORT_VERSION};
pub use inference::{FrameResult, InferenceResult, KeypointDetection, Prediction, SessionStatus};
pub use person::{Person, PersonId, PersonList, PersonUpdate};
pub use selection::Tab;
pub use video::{CropBounds, VideoInfo};
