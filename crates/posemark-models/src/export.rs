//! Portable export document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::annotations::{FrameKey, Position};
use crate::color::Rgb;
use crate::video::VideoInfo;

/// Format version written by this crate.
pub const EXPORT_VERSION: &str = "1.0.0";

/// Exported person, keyed by its export id in [`ExportDocument::persons`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportedPerson {
    pub name: String,
    pub color: Rgb,
}

/// Keypoint name (`LeftShoulder`) -> position.
pub type ExportedKeypoints = BTreeMap<String, Position>;

/// The exported JSON document.
///
/// Persons are keyed by `lowercase(name with whitespace -> _)_<id>`, and
/// keypoints by their English export names rather than numeric ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(default)]
    pub persons: BTreeMap<String, ExportedPerson>,
    pub annotations: BTreeMap<FrameKey, BTreeMap<String, ExportedKeypoints>>,
}

fn default_version() -> String {
    EXPORT_VERSION.to_string()
}
