//! Side-panel tabs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Active side-panel tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Persons,
    Keypoints,
    VideoInfo,
}

impl Tab {
    /// Tab-key order: persons -> keypoints -> videoinfo -> persons.
    pub fn next(self) -> Self {
        match self {
            Tab::Persons => Tab::Keypoints,
            Tab::Keypoints => Tab::VideoInfo,
            Tab::VideoInfo => Tab::Persons,
        }
    }
}
