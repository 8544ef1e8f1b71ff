//! Portable JSON export and all-or-nothing import.
//!
//! Export keys persons as `<slug>_<id>` and keypoints by their English
//! names. Import reverses both mappings and validates the whole document
//! before anything reaches the store.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use posemark_models::catalog::{keypoint, keypoint_by_export_name, keypoint_by_inference_name, person_color};
use posemark_models::export::ExportedKeypoints;
use posemark_models::person::validate_person_name;
use posemark_models::{
    Annotations, ExportDocument, ExportedPerson, FrameAnnotations, Person, PersonId, PersonList,
    VideoInfo, EXPORT_VERSION,
};
use tracing::{info, warn};

use crate::error::ExportImportError;
use crate::state::AnnotationState;

/// Persons, annotations and metadata recovered from an export file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSnapshot {
    pub persons: PersonList,
    pub annotations: Annotations,
    pub video_info: Option<VideoInfo>,
}

fn slug(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Stable, human-readable export keys for every person.
fn export_ids(persons: &PersonList) -> HashMap<PersonId, String> {
    let mut used = HashSet::new();
    let mut ids = HashMap::new();
    for person in persons.iter() {
        let base = format!("{}_{}", slug(&person.name), person.id);
        let key = if used.contains(&base) {
            (2..)
                .map(|n| format!("{}_{}", base, n))
                .find(|k| !used.contains(k))
                .unwrap_or_else(|| base.clone())
        } else {
            base
        };
        used.insert(key.clone());
        ids.insert(person.id.clone(), key);
    }
    ids
}

/// Build the export document for a snapshot.
pub fn export_document(state: &AnnotationState, timestamp: DateTime<Utc>) -> ExportDocument {
    let ids = export_ids(&state.persons);

    let persons = state
        .persons
        .iter()
        .filter_map(|p| {
            ids.get(&p.id).map(|key| {
                (
                    key.clone(),
                    ExportedPerson {
                        name: p.name.clone(),
                        color: p.color,
                    },
                )
            })
        })
        .collect();

    let annotations = state
        .annotations
        .frames()
        .map(|(frame_key, frame)| {
            let entries = frame
                .iter()
                .filter_map(|(person, keypoints)| {
                    let Some(key) = ids.get(person) else {
                        warn!(person_id = %person, frame = %frame_key, "Skipping annotations of unknown person");
                        return None;
                    };
                    let named: ExportedKeypoints = keypoints
                        .iter()
                        .filter_map(|(kp, pos)| keypoint(*kp).map(|k| (k.export_name.to_string(), *pos)))
                        .collect();
                    Some((key.clone(), named))
                })
                .collect();
            (*frame_key, entries)
        })
        .collect();

    ExportDocument {
        version: EXPORT_VERSION.to_string(),
        timestamp,
        video_info: state.video.clone(),
        persons,
        annotations,
    }
}

/// Pretty-printed export JSON.
pub fn export_json(state: &AnnotationState, timestamp: DateTime<Utc>) -> Result<String, ExportImportError> {
    Ok(serde_json::to_string_pretty(&export_document(state, timestamp))?)
}

/// Parse and validate an export file.
pub fn import_json(json: &str) -> Result<ImportedSnapshot, ExportImportError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.get("annotations").is_none() {
        return Err(ExportImportError::MissingField("annotations"));
    }
    let document: ExportDocument = serde_json::from_value(value)?;
    import_document(document)
}

/// Recover the store contents from a parsed document.
pub fn import_document(document: ExportDocument) -> Result<ImportedSnapshot, ExportImportError> {
    let major = document.version.split('.').next().unwrap_or_default();
    let expected_major = EXPORT_VERSION.split('.').next().unwrap_or_default();
    if major != expected_major {
        return Err(ExportImportError::UnsupportedVersion(document.version));
    }

    let mut persons = PersonList::new();
    let mut id_for_key: HashMap<String, PersonId> = HashMap::new();

    for (key, exported) in &document.persons {
        let id = recover_id(key, &exported.name, &persons);
        let name = import_name(key, &exported.name)?;
        persons.push(Person::new(id.clone(), persons.unique_name(&name), exported.color));
        id_for_key.insert(key.clone(), id);
    }

    // Keys sort by name; numeric ids restore creation order
    let mut ordered: Vec<Person> = persons.iter().cloned().collect();
    ordered.sort_by_key(|p| p.id.numeric().map_or((1, 0), |n| (0, n)));
    let mut persons: PersonList = ordered.into_iter().collect();

    let mut frames = BTreeMap::new();
    for (frame_key, entries) in &document.annotations {
        let mut frame = FrameAnnotations::new();
        for (key, keypoints) in entries {
            let id = match id_for_key.get(key) {
                Some(id) => id.clone(),
                None => {
                    // Annotations for a person missing from `persons`
                    let id = recover_id(key, key, &persons);
                    let name = import_name(key, key)?;
                    let person = Person::new(id.clone(), persons.unique_name(&name), person_color(persons.len()));
                    persons.push(person);
                    id_for_key.insert(key.clone(), id.clone());
                    id
                }
            };

            let entry = frame.entry(id).or_insert_with(BTreeMap::new);
            for (name, position) in keypoints {
                let kp = keypoint_by_export_name(name)
                    .or_else(|| keypoint_by_inference_name(name))
                    .ok_or_else(|| ExportImportError::UnknownKeypoint(name.clone()))?;
                if !(position.x.is_finite() && position.y.is_finite()) {
                    return Err(ExportImportError::InvalidPosition {
                        frame: frame_key.to_string(),
                        person: key.clone(),
                        keypoint: name.clone(),
                    });
                }
                entry.insert(kp.id, *position);
            }
        }
        frames.insert(*frame_key, frame);
    }

    let annotations = Annotations::from_frames(frames);
    info!(
        persons = persons.len(),
        frames = annotations.frame_count(),
        keypoints = annotations.keypoint_count(),
        "Export file parsed"
    );

    Ok(ImportedSnapshot {
        persons,
        annotations,
        video_info: document.video_info,
    })
}

/// `<slug>_<id>` yields `<id>` when the slug matches the person's name and
/// the id is free; anything else keeps the whole key as the id.
fn recover_id(key: &str, name: &str, taken: &PersonList) -> PersonId {
    let prefix = format!("{}_", slug(name));
    let candidate = key
        .strip_prefix(&prefix)
        .filter(|rest| !rest.is_empty())
        .map(PersonId::from)
        .filter(|id| !taken.contains(id));
    match candidate {
        Some(id) => id,
        None if !taken.contains(&PersonId::from(key)) => PersonId::from(key),
        None => taken.allocate_id(1),
    }
}

/// The exported name if it is a valid person name, else the export key.
fn import_name(key: &str, name: &str) -> Result<String, ExportImportError> {
    validate_person_name(name).or_else(|e| {
        warn!(key = %key, name = %name, error = %e, "Invalid person name in export file, using its key");
        validate_person_name(key).map_err(|reason| ExportImportError::InvalidName {
            key: key.to_string(),
            reason,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AnnotationStore, NamePolicy};
    use chrono::TimeZone;
    use posemark_models::{Position, Rgb, ValidationError};

    fn sample_store() -> AnnotationStore {
        let mut store = AnnotationStore::new();
        store.load_video(VideoInfo::new(640, 480, 10.0, 30.0));
        let alice = store.create_person("Alice", NamePolicy::AutoSuffix).unwrap();
        let bob = store.create_person("Bob Smith", NamePolicy::AutoSuffix).unwrap();
        store.add_annotation(0, &alice.id, 0, Position::new(100.0, 200.0)).unwrap();
        store.add_annotation(0, &bob.id, 5, Position::new(10.0, 20.0)).unwrap();
        store.add_annotation(7, &bob.id, 16, Position::new(30.0, 40.0)).unwrap();
        store
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_export_shape() {
        let store = sample_store();
        let json = export_json(&store.snapshot(), timestamp()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["videoInfo"]["frameRate"], 30.0);
        assert_eq!(value["persons"]["alice_1"]["name"], "Alice");
        assert_eq!(value["persons"]["bob_smith_2"]["color"], "#3877ff");
        assert_eq!(value["annotations"]["frame_0"]["alice_1"]["Nose"]["x"], 100.0);
        assert_eq!(value["annotations"]["frame_0"]["bob_smith_2"]["LeftShoulder"]["y"], 20.0);
        assert_eq!(value["annotations"]["frame_7"]["bob_smith_2"]["RightAnkle"]["x"], 30.0);
    }

    #[test]
    fn test_import_restores_ids_and_keypoints() {
        let store = sample_store();
        let original = store.snapshot();
        let json = export_json(&original, timestamp()).unwrap();

        let imported = import_json(&json).unwrap();
        assert_eq!(imported.persons, original.persons);
        assert_eq!(imported.annotations, original.annotations);
        assert_eq!(imported.video_info, original.video);
    }

    #[test]
    fn test_export_key_collisions_get_suffixes() {
        let persons: PersonList = [
            Person::new("1_2", "a", Rgb::new(0, 0, 0)),
            Person::new("2", "A 1", Rgb::new(0, 0, 0)),
            Person::new("7", "", Rgb::new(0, 0, 0)),
        ]
        .into_iter()
        .collect();
        let ids = export_ids(&persons);
        assert_eq!(ids[&PersonId::from("1_2")], "a_1_2");
        assert_eq!(ids[&PersonId::from("2")], "a_1_2_2");
        assert_eq!(ids[&PersonId::from("7")], "_7");
    }

    #[test]
    fn test_import_rejects_missing_annotations() {
        let err = import_json(r#"{"version": "1.0.0", "persons": {}}"#).unwrap_err();
        assert!(matches!(err, ExportImportError::MissingField("annotations")));

        let err = import_json("not json").unwrap_err();
        assert!(matches!(err, ExportImportError::Malformed(_)));
    }

    #[test]
    fn test_import_rejects_unknown_keypoint() {
        let json = r##"{
            "persons": {"alice_1": {"name": "Alice", "color": "#ff6b6b"}},
            "annotations": {"frame_0": {"alice_1": {"Tail": {"x": 1, "y": 2}}}}
        }"##;
        let err = import_json(json).unwrap_err();
        assert!(matches!(err, ExportImportError::UnknownKeypoint(ref n) if n == "Tail"));
    }

    #[test]
    fn test_import_unlisted_person_and_renamed_key() {
        let json = r##"{
            "version": "1.2.0",
            "persons": {"runner_9": {"name": "Walker", "color": "#00ff00"}},
            "annotations": {
                "frame_3": {
                    "runner_9": {"Nose": {"x": 1, "y": 2}},
                    "ghost": {"left_wrist": {"x": 3, "y": 4}}
                }
            }
        }"##;
        let imported = import_json(json).unwrap();

        // Slug does not match the name, so the whole key becomes the id
        let walker = PersonId::from("runner_9");
        assert_eq!(imported.persons.get(&walker).unwrap().name, "Walker");

        let ghost = PersonId::from("ghost");
        assert_eq!(imported.persons.get(&ghost).unwrap().name, "ghost");
        assert_eq!(imported.annotations.get(3, &ghost, 9), Some(Position::new(3.0, 4.0)));
    }

    #[test]
    fn test_import_keeps_person_order() {
        let mut store = AnnotationStore::new();
        store.create_person("Zed", NamePolicy::AutoSuffix).unwrap();
        store.create_person("Amy", NamePolicy::AutoSuffix).unwrap();
        let json = export_json(&store.snapshot(), timestamp()).unwrap();

        let imported = import_json(&json).unwrap();
        let names: Vec<&str> = imported.persons.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Zed", "Amy"]);
    }

    #[test]
    fn test_import_invalid_name_falls_back_to_key() {
        let json = r##"{
            "persons": {"bad_1": {"name": "a@b", "color": "#ff6b6b"}, "blank_2": {"name": " ", "color": "#00ff00"}},
            "annotations": {}
        }"##;
        let imported = import_json(json).unwrap();
        let names: Vec<&str> = imported.persons.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["bad_1", "blank_2"]);
    }

    #[test]
    fn test_import_rejects_unusable_name() {
        let key = "x".repeat(60);
        let json = format!(
            r##"{{"persons": {{"{key}": {{"name": "{key}", "color": "#ff6b6b"}}}}, "annotations": {{}}}}"##
        );
        let err = import_json(&json).unwrap_err();
        assert!(matches!(
            err,
            ExportImportError::InvalidName { reason: ValidationError::NameTooLong { max: 50 }, .. }
        ));
    }

    #[test]
    fn test_import_rejects_other_major_version() {
        let err = import_json(r#"{"version": "2.0.0", "annotations": {}}"#).unwrap_err();
        assert!(matches!(err, ExportImportError::UnsupportedVersion(ref v) if v == "2.0.0"));
    }
}
