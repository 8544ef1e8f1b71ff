//! Per-frame results emitted by the pose-estimation program.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One detected keypoint, in original video pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeypointDetection {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// Detections for one person on one frame.
///
/// Keypoints are keyed by the program's own naming (`left_shoulder`); the
/// person may be identified by id, by name, both, or neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Prediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hex color; unparseable values are ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub keypoints: BTreeMap<String, KeypointDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Predictions for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameResult {
    pub frame: u64,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
}

/// Terminal session status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    Completed,
    Error { error: String },
}

/// Anything the program can report: a frame, or the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum InferenceResult {
    Frame(FrameResult),
    Status(SessionStatus),
}

impl InferenceResult {
    pub fn completed() -> Self {
        Self::Status(SessionStatus::Completed)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Status(SessionStatus::Error {
            error: message.into(),
        })
    }

    /// Whether this result ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Status(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_result() {
        let json = r#"{
            "frame": 5,
            "predictions": [{
                "person_id": "left",
                "keypoints": {"nose": {"x": 10.4, "y": 20.6, "confidence": 0.9}},
                "bbox": [0, 0, 10, 10],
                "confidence": 0.8
            }],
            "processing_time_ms": 12.5
        }"#;
        match serde_json::from_str::<InferenceResult>(json).unwrap() {
            InferenceResult::Frame(frame) => {
                assert_eq!(frame.frame, 5);
                assert_eq!(frame.predictions[0].person_id.as_deref(), Some("left"));
                assert_eq!(frame.predictions[0].keypoints["nose"].confidence, 0.9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_statuses() {
        let done: InferenceResult = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert_eq!(done, InferenceResult::completed());
        assert!(done.is_terminal());

        let failed: InferenceResult =
            serde_json::from_str(r#"{"status":"error","error":"model missing"}"#).unwrap();
        assert_eq!(failed, InferenceResult::error("model missing"));
    }

    #[test]
    fn test_empty_predictions_are_valid() {
        let result: InferenceResult = serde_json::from_str(r#"{"frame": 3}"#).unwrap();
        assert!(matches!(result, InferenceResult::Frame(ref f) if f.predictions.is_empty()));
    }

    #[test]
    fn test_rejects_unknown_shape() {
        assert!(serde_json::from_str::<InferenceResult>(r#"{"status":"paused"}"#).is_err());
    }
}
