//! Keypoint catalog, skeleton graph and person palette.
//!
//! The catalog order is the canonical cyclic order used for keypoint
//! auto-advance and wheel cycling.

use serde::Serialize;

use crate::color::Rgb;

/// Numeric keypoint identifier (index into [`KEYPOINTS`]).
pub type KeypointId = u32;

/// Number of tracked keypoints.
pub const KEYPOINT_COUNT: usize = 17;

/// Upper bound on persons created interactively.
pub const MAX_PERSONS: usize = 20;

/// Frame rate assumed when the media does not report one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Keypoint {
    pub id: KeypointId,
    /// Display name ("left shoulder")
    pub name: &'static str,
    /// Name used in export files ("LeftShoulder")
    pub export_name: &'static str,
    pub color: Rgb,
}

impl Keypoint {
    /// Snake-case name used by the pose-estimation program ("left_shoulder").
    pub fn inference_name(&self) -> String {
        self.name.replace(' ', "_")
    }
}

const fn kp(id: KeypointId, name: &'static str, export_name: &'static str, hex: u32) -> Keypoint {
    Keypoint {
        id,
        name,
        export_name,
        color: Rgb::from_hex(hex),
    }
}

/// The 17 keypoints of the standard human-pose layout.
pub static KEYPOINTS: [Keypoint; KEYPOINT_COUNT] = [
    kp(0, "nose", "Nose", 0xff0000),
    kp(1, "left eye", "LeftEye", 0xff4500),
    kp(2, "right eye", "RightEye", 0xff4500),
    kp(3, "left ear", "LeftEar", 0xff8c00),
    kp(4, "right ear", "RightEar", 0xff8c00),
    kp(5, "left shoulder", "LeftShoulder", 0xffd700),
    kp(6, "right shoulder", "RightShoulder", 0xffd700),
    kp(7, "left elbow", "LeftElbow", 0x90ee90),
    kp(8, "right elbow", "RightElbow", 0x90ee90),
    kp(9, "left wrist", "LeftWrist", 0x00ced1),
    kp(10, "right wrist", "RightWrist", 0x00ced1),
    kp(11, "left hip", "LeftHip", 0x1e90ff),
    kp(12, "right hip", "RightHip", 0x1e90ff),
    kp(13, "left knee", "LeftKnee", 0x9370db),
    kp(14, "right knee", "RightKnee", 0x9370db),
    kp(15, "left ankle", "LeftAnkle", 0x8a2be2),
    kp(16, "right ankle", "RightAnkle", 0x8a2be2),
];

/// Keypoint pairs joined by a line when both ends are annotated.
pub static SKELETON_CONNECTIONS: [(KeypointId, KeypointId); 18] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (3, 5),
    (4, 6),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

/// Palette assigned to persons in creation order.
pub static PERSON_COLORS: [Rgb; 8] = [
    Rgb::from_hex(0xff3838),
    Rgb::from_hex(0x3877ff),
    Rgb::from_hex(0x38ff38),
    Rgb::from_hex(0xff38ff),
    Rgb::from_hex(0xffb738),
    Rgb::from_hex(0x38ffff),
    Rgb::from_hex(0xff9c9c),
    Rgb::from_hex(0x9c9cff),
];

/// Canvas drawing constants.
pub mod style {
    use crate::color::Rgb;

    pub const SKELETON_COLOR: Rgb = Rgb::from_hex(0x00ff00);
    pub const SKELETON_LINE_WIDTH: f64 = 2.0;
    pub const KEYPOINT_RADIUS: f64 = 6.0;
    pub const KEYPOINT_STROKE_COLOR: Rgb = Rgb::from_hex(0xffffff);
    pub const KEYPOINT_STROKE_WIDTH: f64 = 2.0;
}

/// Look up a keypoint by id.
pub fn keypoint(id: KeypointId) -> Option<&'static Keypoint> {
    KEYPOINTS.iter().find(|k| k.id == id)
}

/// Whether `id` names a catalog keypoint.
pub fn is_known_keypoint(id: KeypointId) -> bool {
    keypoint(id).is_some()
}

/// First keypoint in catalog order.
pub fn first_keypoint() -> KeypointId {
    KEYPOINTS[0].id
}

/// Next keypoint in catalog order, wrapping after the last.
/// `None` (or an unknown id) starts at the first keypoint.
pub fn next_keypoint(current: Option<KeypointId>) -> KeypointId {
    match current.and_then(catalog_index) {
        Some(i) => KEYPOINTS[(i + 1) % KEYPOINT_COUNT].id,
        None => first_keypoint(),
    }
}

/// Previous keypoint in catalog order, wrapping before the first.
/// `None` (or an unknown id) starts at the last keypoint.
pub fn prev_keypoint(current: Option<KeypointId>) -> KeypointId {
    match current.and_then(catalog_index) {
        Some(i) => KEYPOINTS[(i + KEYPOINT_COUNT - 1) % KEYPOINT_COUNT].id,
        None => KEYPOINTS[KEYPOINT_COUNT - 1].id,
    }
}

fn catalog_index(id: KeypointId) -> Option<usize> {
    KEYPOINTS.iter().position(|k| k.id == id)
}

/// Resolve an export-file keypoint name (`LeftShoulder`). Exact match only.
pub fn keypoint_by_export_name(name: &str) -> Option<&'static Keypoint> {
    KEYPOINTS.iter().find(|k| k.export_name == name)
}

/// Resolve a keypoint name coming from the pose-estimation program.
///
/// Case, separators and spacing are ignored, so `left_shoulder`,
/// `left shoulder` and `LeftShoulder` all resolve to the same entry.
pub fn keypoint_by_inference_name(name: &str) -> Option<&'static Keypoint> {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
        return None;
    }
    KEYPOINTS
        .iter()
        .find(|k| normalize_name(k.export_name) == wanted)
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Palette color for the person created at position `index`.
pub fn person_color(index: usize) -> Rgb {
    PERSON_COLORS[index % PERSON_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_sequential() {
        for (i, k) in KEYPOINTS.iter().enumerate() {
            assert_eq!(k.id as usize, i);
        }
    }

    #[test]
    fn test_skeleton_references_known_keypoints() {
        for (a, b) in SKELETON_CONNECTIONS.iter() {
            assert!(is_known_keypoint(*a));
            assert!(is_known_keypoint(*b));
        }
    }

    #[test]
    fn test_next_and_prev_wrap() {
        assert_eq!(next_keypoint(None), 0);
        assert_eq!(next_keypoint(Some(0)), 1);
        assert_eq!(next_keypoint(Some(16)), 0);
        assert_eq!(prev_keypoint(Some(0)), 16);
        assert_eq!(prev_keypoint(Some(5)), 4);
        assert_eq!(prev_keypoint(None), 16);
    }

    #[test]
    fn test_full_cycle_returns_to_start() {
        let mut current = 7;
        for _ in 0..KEYPOINT_COUNT {
            current = next_keypoint(Some(current));
        }
        assert_eq!(current, 7);
    }

    #[test]
    fn test_name_lookups() {
        assert_eq!(keypoint_by_export_name("LeftShoulder").map(|k| k.id), Some(5));
        assert!(keypoint_by_export_name("left_shoulder").is_none());

        assert_eq!(keypoint_by_inference_name("left_shoulder").map(|k| k.id), Some(5));
        assert_eq!(keypoint_by_inference_name("Right Ankle").map(|k| k.id), Some(16));
        assert_eq!(keypoint_by_inference_name("NOSE").map(|k| k.id), Some(0));
        assert!(keypoint_by_inference_name("tail").is_none());
        assert!(keypoint_by_inference_name("__").is_none());
    }

    #[test]
    fn test_inference_name() {
        assert_eq!(KEYPOINTS[9].inference_name(), "left_wrist");
    }

    #[test]
    fn test_person_color_cycles() {
        assert_eq!(person_color(0), PERSON_COLORS[0]);
        assert_eq!(person_color(8), PERSON_COLORS[0]);
        assert_eq!(person_color(9), PERSON_COLORS[1]);
    }
}
