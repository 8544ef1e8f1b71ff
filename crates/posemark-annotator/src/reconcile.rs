//! Merge inference predictions into the annotation state.
//!
//! Predicted persons are matched to tracked persons by name first
//! (case-insensitively), then by id. Unmatched predictions become new
//! persons. Only keypoints detected with confidence above
//! [`MIN_CONFIDENCE`] are recorded.

use std::collections::BTreeMap;

use metrics::counter;
use posemark_models::api::{ContinueRequest, PersonSummary};
use posemark_models::catalog::{keypoint, keypoint_by_inference_name, person_color};
use posemark_models::person::validate_person_name;
use posemark_models::{FrameResult, Person, PersonId, Position, Prediction, Rgb};
use tracing::{debug, info};

use crate::state::AnnotationState;

/// Detections at or below this confidence are dropped.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// What one frame of results did to the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Frame the view moved to
    pub frame: u64,
    pub created: Vec<PersonId>,
    /// Matched by id and renamed or recolored in place
    pub updated: Vec<PersonId>,
    /// Working identity -> existing person it was matched to by name
    pub remapped: Vec<(String, PersonId)>,
    pub accepted: usize,
    pub rejected: usize,
}

/// Apply one frame of results to `state`.
pub fn reconcile(state: &mut AnnotationState, result: &FrameResult) -> ReconcileReport {
    let frame = state.clamp_frame(result.frame);
    let mut report = ReconcileReport {
        frame,
        ..Default::default()
    };

    for (index, prediction) in result.predictions.iter().enumerate() {
        let person = resolve_person(state, index, prediction, &mut report);

        for (name, detection) in &prediction.keypoints {
            let Some(kp) = keypoint_by_inference_name(name) else {
                debug!(keypoint = %name, "Skipping unrecognized keypoint");
                report.rejected += 1;
                continue;
            };
            if detection.confidence.is_nan() || detection.confidence <= MIN_CONFIDENCE {
                report.rejected += 1;
                continue;
            }

            let position = Position::new(detection.x, detection.y).rounded();
            match state.add_annotation(frame, &person, kp.id, position) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    debug!(person_id = %person, keypoint = %name, error = %e, "Prediction rejected");
                    report.rejected += 1;
                }
            }
        }
    }

    state.go_to_frame(frame);

    counter!("posemark_predictions_accepted_total").increment(report.accepted as u64);
    counter!("posemark_predictions_rejected_total").increment(report.rejected as u64);
    info!(
        frame,
        predictions = result.predictions.len(),
        created = report.created.len(),
        accepted = report.accepted,
        rejected = report.rejected,
        "Inference results merged"
    );

    report
}

fn resolve_person(
    state: &mut AnnotationState,
    index: usize,
    prediction: &Prediction,
    report: &mut ReconcileReport,
) -> PersonId {
    let explicit_id = non_empty(prediction.person_id.as_deref());
    let explicit_name = non_empty(prediction.name.as_deref());
    let working_id = explicit_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("person_{index}"));
    let name = explicit_name.unwrap_or(&working_id).to_string();
    let color = prediction
        .color
        .as_deref()
        .and_then(|c| c.parse::<Rgb>().ok());

    if let Some(existing) = state.persons.find_by_name(&name) {
        let id = existing.id.clone();
        if id.as_str() != working_id {
            report.remapped.push((working_id, id.clone()));
        }
        return id;
    }

    let candidate = PersonId::from(working_id.as_str());
    if let Some(existing) = state.persons.get_mut(&candidate) {
        if explicit_name.is_some() {
            if let Ok(valid) = validate_person_name(&name) {
                existing.name = valid;
            }
        }
        if let Some(color) = color {
            existing.color = color;
        }
        report.updated.push(candidate.clone());
        return candidate;
    }

    let id = if explicit_id.is_some() {
        candidate
    } else {
        state.allocate_person_id()
    };
    let name = validate_person_name(&name)
        .map(|valid| state.persons.unique_name(&valid))
        .unwrap_or_else(|_| format!("Person {}", id));
    let color = color.unwrap_or_else(|| person_color(state.persons.len()));

    debug!(person_id = %id, name = %name, "Person created from prediction");
    state.insert_person(Person::new(id.clone(), name, color));
    report.created.push(id.clone());
    id
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Corrected annotations of `frame`, in the shape the backend expects.
pub fn corrections_for_frame(state: &AnnotationState, frame: u64) -> ContinueRequest {
    let persons = state
        .persons
        .iter()
        .map(|p| {
            (
                p.id.clone(),
                PersonSummary {
                    name: p.name.clone(),
                    color: p.color,
                },
            )
        })
        .collect();

    let annotations = state
        .annotations
        .frame(frame)
        .map(|persons| {
            persons
                .iter()
                .map(|(id, keypoints)| {
                    let named: BTreeMap<String, Position> = keypoints
                        .iter()
                        .filter_map(|(kp, pos)| keypoint(*kp).map(|k| (k.inference_name(), *pos)))
                        .collect();
                    (id.clone(), named)
                })
                .collect()
        })
        .unwrap_or_default();

    ContinueRequest {
        frame_number: frame,
        persons,
        annotations,
    }
}
