//! The frame -> person -> keypoint -> position annotation map.
//!
//! [`Annotations`] is a value type: every edit goes through a pure function
//! that returns a new map, so a snapshot held by a reader never changes
//! underneath it. A frame entry exists only while at least one person has at
//! least one keypoint recorded for it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::catalog::KeypointId;
use crate::error::ModelError;
use crate::person::{PersonId, PersonList};

/// A point in original (uncropped) video pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates rounded to the nearest integer.
    pub fn rounded(&self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
        }
    }
}

/// Mapping key for a frame index, rendered as `frame_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey(pub u64);

impl FrameKey {
    pub const PREFIX: &'static str = "frame_";

    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u64 {
        self.0
    }
}

impl From<u64> for FrameKey {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for FrameKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(Self::PREFIX)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ModelError::InvalidFrameKey(s.to_string()))?;
        digits
            .parse()
            .map(Self)
            .map_err(|_| ModelError::InvalidFrameKey(s.to_string()))
    }
}

impl Serialize for FrameKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for FrameKey {
    fn schema_name() -> String {
        "FrameKey".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// Format a frame index as its mapping key.
pub fn format_frame_key(index: u64) -> String {
    FrameKey(index).to_string()
}

/// Parse a mapping key back to its frame index.
pub fn parse_frame_key(key: &str) -> Option<u64> {
    key.parse::<FrameKey>().ok().map(|k| k.0)
}

/// Keypoints recorded for one person on one frame.
pub type PersonKeypoints = BTreeMap<KeypointId, Position>;

/// Persons annotated on one frame.
pub type FrameAnnotations = BTreeMap<PersonId, PersonKeypoints>;

/// The whole annotation map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Annotations {
    frames: BTreeMap<FrameKey, FrameAnnotations>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw frames, dropping empty person and frame entries.
    pub fn from_frames(frames: BTreeMap<FrameKey, FrameAnnotations>) -> Self {
        let mut annotations = Self { frames };
        annotations.prune();
        annotations
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of annotated frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> impl Iterator<Item = (&FrameKey, &FrameAnnotations)> {
        self.frames.iter()
    }

    pub fn frame(&self, frame: u64) -> Option<&FrameAnnotations> {
        self.frames.get(&FrameKey(frame))
    }

    pub fn person_keypoints(&self, frame: u64, person: &PersonId) -> Option<&PersonKeypoints> {
        self.frame(frame).and_then(|f| f.get(person))
    }

    pub fn get(&self, frame: u64, person: &PersonId, keypoint: KeypointId) -> Option<Position> {
        self.person_keypoints(frame, person)
            .and_then(|kps| kps.get(&keypoint))
            .copied()
    }

    pub fn frame_has_annotations(&self, frame: u64) -> bool {
        self.frames.contains_key(&FrameKey(frame))
    }

    /// Indices of annotated frames, ascending.
    pub fn annotated_frames(&self) -> Vec<u64> {
        self.frames.keys().map(FrameKey::index).collect()
    }

    /// Total number of recorded positions.
    pub fn keypoint_count(&self) -> usize {
        self.frames
            .values()
            .flat_map(|f| f.values())
            .map(BTreeMap::len)
            .sum()
    }

    /// Whether any frame references `person`.
    pub fn references_person(&self, person: &PersonId) -> bool {
        self.frames.values().any(|f| f.contains_key(person))
    }

    /// Distinct person ids referenced anywhere, ascending.
    pub fn person_ids(&self) -> Vec<PersonId> {
        let mut ids: Vec<PersonId> = self
            .frames
            .values()
            .flat_map(|f| f.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Copy with `position` recorded at `(frame, person, keypoint)`,
    /// overwriting any previous value for that triple.
    pub fn with_annotation(
        &self,
        frame: u64,
        person: &PersonId,
        keypoint: KeypointId,
        position: Position,
    ) -> Self {
        let mut next = self.clone();
        next.frames
            .entry(FrameKey(frame))
            .or_default()
            .entry(person.clone())
            .or_default()
            .insert(keypoint, position);
        next
    }

    /// Copy with every entry for `person` removed, pruning frames left empty.
    pub fn without_person(&self, person: &PersonId) -> Self {
        let mut next = self.clone();
        for frame in next.frames.values_mut() {
            frame.remove(person);
        }
        next.frames.retain(|_, f| !f.is_empty());
        next
    }

    /// Copy with the whole frame removed.
    pub fn without_frame(&self, frame: u64) -> Self {
        let mut next = self.clone();
        next.frames.remove(&FrameKey(frame));
        next
    }

    /// Copy with a single position removed, pruning empty leaves.
    pub fn without_annotation(&self, frame: u64, person: &PersonId, keypoint: KeypointId) -> Self {
        let mut next = self.clone();
        let key = FrameKey(frame);
        if let Some(persons) = next.frames.get_mut(&key) {
            if let Some(keypoints) = persons.get_mut(person) {
                keypoints.remove(&keypoint);
                if keypoints.is_empty() {
                    persons.remove(person);
                }
            }
            if persons.is_empty() {
                next.frames.remove(&key);
            }
        }
        next
    }

    /// Copy with frame `target` replaced by the contents of frame `source`.
    /// An unannotated source clears the target.
    pub fn with_frame_copied(&self, source: u64, target: u64) -> Self {
        let mut next = self.clone();
        match self.frames.get(&FrameKey(source)) {
            Some(frame) => {
                next.frames.insert(FrameKey(target), frame.clone());
            }
            None => {
                next.frames.remove(&FrameKey(target));
            }
        }
        next
    }

    /// Overall progress figures.
    pub fn stats(&self, total_frames: u64, total_persons: usize) -> AnnotationStats {
        let annotated_frames = self.frames.len() as u64;
        let completion_rate = if total_frames > 0 {
            annotated_frames as f64 / total_frames as f64 * 100.0
        } else {
            0.0
        };
        AnnotationStats {
            total_frames,
            annotated_frames,
            total_persons,
            total_keypoints: self.keypoint_count(),
            completion_rate,
        }
    }

    /// Progress figures for one person.
    pub fn person_stats(&self, person: &PersonId) -> PersonStats {
        let per_frame: Vec<usize> = self
            .frames
            .values()
            .filter_map(|f| f.get(person))
            .map(BTreeMap::len)
            .collect();
        let total_frames = per_frame.len();
        let total_keypoints: usize = per_frame.iter().sum();
        let average = if total_frames > 0 {
            (total_keypoints as f64 / total_frames as f64 * 10.0).round() / 10.0
        } else {
            0.0
        };
        PersonStats {
            total_frames,
            total_keypoints,
            average_keypoints_per_frame: average,
        }
    }

    /// Drop person entries whose id is not in `persons`.
    pub fn retain_persons(&self, persons: &PersonList) -> Self {
        let mut next = self.clone();
        for frame in next.frames.values_mut() {
            frame.retain(|id, _| persons.contains(id));
        }
        next.frames.retain(|_, f| !f.is_empty());
        next
    }

    fn prune(&mut self) {
        for frame in self.frames.values_mut() {
            frame.retain(|_, kps| !kps.is_empty());
        }
        self.frames.retain(|_, f| !f.is_empty());
    }
}

/// Progress across the whole video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationStats {
    pub total_frames: u64,
    pub annotated_frames: u64,
    pub total_persons: usize,
    pub total_keypoints: usize,
    /// Percentage of frames with at least one annotation
    pub completion_rate: f64,
}

/// Progress for one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonStats {
    pub total_frames: usize,
    pub total_keypoints: usize,
    pub average_keypoints_per_frame: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PersonId {
        PersonId::from(s)
    }

    #[test]
    fn test_frame_key_round_trip() {
        for n in [0u64, 1, 9, 10, 299, 123_456_789, u64::MAX] {
            assert_eq!(parse_frame_key(&format_frame_key(n)), Some(n));
        }
        assert_eq!(format_frame_key(42), "frame_42");
    }

    #[test]
    fn test_frame_key_rejects_malformed() {
        for key in ["frame_", "frame_-1", "frame_1a", "Frame_1", "1", "frame_ 1", "frame_+1"] {
            assert_eq!(parse_frame_key(key), None, "{key}");
        }
    }

    #[test]
    fn test_with_annotation_creates_path_and_overwrites() {
        let a = Annotations::new();
        let b = a.with_annotation(3, &pid("1"), 0, Position::new(1.0, 2.0));
        assert!(a.is_empty());
        assert_eq!(b.get(3, &pid("1"), 0), Some(Position::new(1.0, 2.0)));

        let c = b.with_annotation(3, &pid("1"), 0, Position::new(5.0, 6.0));
        assert_eq!(c.get(3, &pid("1"), 0), Some(Position::new(5.0, 6.0)));
        assert_eq!(c.keypoint_count(), 1);
    }

    #[test]
    fn test_with_annotation_is_idempotent() {
        let base = Annotations::new().with_annotation(0, &pid("2"), 4, Position::new(9.0, 9.0));
        let once = base.with_annotation(1, &pid("1"), 3, Position::new(1.0, 1.0));
        let twice = once.with_annotation(1, &pid("1"), 3, Position::new(1.0, 1.0));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_without_person_cascades() {
        let a = Annotations::new()
            .with_annotation(0, &pid("1"), 0, Position::new(1.0, 1.0))
            .with_annotation(0, &pid("2"), 0, Position::new(2.0, 2.0))
            .with_annotation(5, &pid("1"), 3, Position::new(3.0, 3.0));

        let b = a.without_person(&pid("1"));
        assert!(!b.references_person(&pid("1")));
        assert!(b.frame_has_annotations(0));
        assert!(!b.frame_has_annotations(5));
        assert_eq!(b.annotated_frames(), vec![0]);
    }

    #[test]
    fn test_without_annotation_prunes() {
        let a = Annotations::new().with_annotation(2, &pid("1"), 7, Position::new(1.0, 1.0));
        let b = a.without_annotation(2, &pid("1"), 7);
        assert!(b.is_empty());
        // unknown triple is a no-op
        assert_eq!(a.without_annotation(2, &pid("9"), 7), a);
    }

    #[test]
    fn test_without_frame_and_copy() {
        let a = Annotations::new()
            .with_annotation(1, &pid("1"), 0, Position::new(1.0, 1.0))
            .with_annotation(2, &pid("1"), 0, Position::new(2.0, 2.0));
        assert_eq!(a.without_frame(1).annotated_frames(), vec![2]);

        let copied = a.with_frame_copied(1, 7);
        assert_eq!(copied.get(7, &pid("1"), 0), Some(Position::new(1.0, 1.0)));
        assert!(!a.with_frame_copied(4, 2).frame_has_annotations(2));
    }

    #[test]
    fn test_annotated_frames_sorted_numerically() {
        let a = Annotations::new()
            .with_annotation(10, &pid("1"), 0, Position::new(0.0, 0.0))
            .with_annotation(2, &pid("1"), 0, Position::new(0.0, 0.0));
        assert_eq!(a.annotated_frames(), vec![2, 10]);
    }

    #[test]
    fn test_serde_shape() {
        let a = Annotations::new().with_annotation(0, &pid("1"), 0, Position::new(100.0, 200.0));
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["frame_0"]["1"]["0"]["x"], 100.0);

        let back: Annotations = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_from_frames_prunes_empty() {
        let mut frames = BTreeMap::new();
        let mut empty_person = FrameAnnotations::new();
        empty_person.insert(pid("1"), PersonKeypoints::new());
        frames.insert(FrameKey(0), empty_person);
        frames.insert(FrameKey(1), FrameAnnotations::new());
        assert!(Annotations::from_frames(frames).is_empty());
    }

    #[test]
    fn test_stats() {
        let a = Annotations::new()
            .with_annotation(0, &pid("1"), 0, Position::new(0.0, 0.0))
            .with_annotation(0, &pid("1"), 1, Position::new(0.0, 0.0))
            .with_annotation(1, &pid("1"), 0, Position::new(0.0, 0.0))
            .with_annotation(1, &pid("2"), 0, Position::new(0.0, 0.0));

        let stats = a.stats(10, 2);
        assert_eq!(stats.annotated_frames, 2);
        assert_eq!(stats.total_keypoints, 4);
        assert!((stats.completion_rate - 20.0).abs() < f64::EPSILON);

        let person = a.person_stats(&pid("1"));
        assert_eq!(person.total_frames, 2);
        assert_eq!(person.total_keypoints, 3);
        assert!((person.average_keypoints_per_frame - 1.5).abs() < f64::EPSILON);
        assert_eq!(a.person_stats(&pid("9")).total_frames, 0);
    }
}
