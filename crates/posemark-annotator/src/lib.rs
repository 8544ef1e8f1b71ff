//! Core of the Posemark keypoint annotator.
//!
//! - [`store`]: the annotation state machine and its immutable snapshots
//! - [`reconcile`]: merging inference predictions into the store
//! - [`canvas`]: pointer mapping and the per-frame render plan
//! - [`export`]: the portable JSON document
//! - [`workspace`]: one video, one store, at most one inference session

pub mod canvas;
pub mod config;
pub mod error;
pub mod export;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod workspace;

pub use canvas::{CanvasGeometry, ClickOutcome, DrawCommand, FitMode, RenderOptions, Viewport};
pub use config::{AnnotatorConfig, CropPolicy};
pub use error::{AnnotatorError, AnnotatorResult, ExportImportError};
pub use export::{export_document, import_document, import_json, ImportedSnapshot};
pub use reconcile::{corrections_for_frame, ReconcileReport};
pub use state::{AnnotationState, Selection};
pub use store::{AnnotationStore, CycleDirection, NamePolicy};
pub use workspace::{InferenceStep, Workspace};
