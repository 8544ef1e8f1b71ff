//! HTTP envelopes of the inference backend.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::annotations::Position;
use crate::color::Rgb;
use crate::inference::InferenceResult;
use crate::person::PersonId;

/// `status` value of a `next` response that timed out without a result.
pub const NEXT_STATUS_TIMEOUT: &str = "timeout";

/// `GET /api/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            message: "Backend is running".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok") || self.status.eq_ignore_ascii_case("healthy")
    }
}

/// `POST /api/inference/start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub video_path: String,
}

/// Generic `{success, message}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AckResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// `GET /api/inference/next`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NextResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InferenceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NextResponse {
    pub fn result(data: InferenceResult) -> Self {
        Self {
            success: true,
            data: Some(data),
            status: None,
            message: None,
        }
    }

    pub fn timeout() -> Self {
        Self {
            success: false,
            data: None,
            status: Some(NEXT_STATUS_TIMEOUT.to_string()),
            message: Some("No result available yet".to_string()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status.as_deref() == Some(NEXT_STATUS_TIMEOUT)
    }
}

/// Name and color of a person, as sent along with corrections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersonSummary {
    pub name: String,
    pub color: Rgb,
}

/// `POST /api/inference/continue`: human-corrected annotations for one frame.
///
/// Keypoints are keyed by their snake-case inference names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    pub frame_number: u64,
    #[serde(default)]
    pub persons: BTreeMap<PersonId, PersonSummary>,
    #[serde(default)]
    pub annotations: BTreeMap<PersonId, BTreeMap<String, Position>>,
}

/// `POST /api/upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_timeout_shape() {
        let json = serde_json::to_value(NextResponse::timeout()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["status"], "timeout");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_next_with_data_round_trip() {
        let body = r#"{"success":true,"data":{"status":"completed"}}"#;
        let parsed: NextResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data, Some(InferenceResult::completed()));
        assert!(!parsed.is_timeout());
    }

    #[test]
    fn test_continue_request_camel_case() {
        let request = ContinueRequest {
            frame_number: 4,
            persons: BTreeMap::new(),
            annotations: BTreeMap::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["frameNumber"], 4);
    }

    #[test]
    fn test_health() {
        assert!(HealthResponse::ok().is_ok());
        let json = serde_json::to_value(HealthResponse::ok()).unwrap();
        assert_eq!(json["message"], "Backend is running");
    }
}
