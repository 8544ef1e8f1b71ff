//! Single-writer annotation store with immutable snapshots.
//!
//! Readers hold `Arc<AnnotationState>` snapshots that never change; each
//! accepted mutation publishes a whole new snapshot to every subscriber.
//! Mutations take `&mut self`, so there is exactly one writer at a time.

use std::sync::Arc;

use posemark_models::{
    AnnotationStats, CropBounds, FrameResult, KeypointId, Person, PersonId, PersonStats,
    PersonUpdate, Position, Tab, ValidationResult, VideoInfo,
};
use tokio::sync::watch;

use crate::export::ImportedSnapshot;
use crate::reconcile::{reconcile, ReconcileReport};
use crate::state::AnnotationState;

/// How person creation handles a name already in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePolicy {
    /// Append `_1`, `_2`, ... until the name is free
    #[default]
    AutoSuffix,
    /// Fail with a duplicate-name error
    Reject,
}

/// Direction for keypoint cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Next,
    Previous,
}

/// The annotation store.
pub struct AnnotationStore {
    tx: watch::Sender<Arc<AnnotationState>>,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::from_state(AnnotationState::default())
    }

    pub fn from_state(state: AnnotationState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(state));
        Self { tx }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<AnnotationState> {
        self.tx.borrow().clone()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AnnotationState>> {
        self.tx.subscribe()
    }

    /// Run a transition on a copy of the current state and publish the copy
    /// only if the transition succeeds.
    fn edit<T>(&mut self, f: impl FnOnce(&mut AnnotationState) -> ValidationResult<T>) -> ValidationResult<T> {
        let mut next = AnnotationState::clone(&self.tx.borrow());
        let value = f(&mut next)?;
        self.tx.send_replace(Arc::new(next));
        Ok(value)
    }

    fn apply<T>(&mut self, f: impl FnOnce(&mut AnnotationState) -> T) -> T {
        let mut next = AnnotationState::clone(&self.tx.borrow());
        let value = f(&mut next);
        self.tx.send_replace(Arc::new(next));
        value
    }

    pub fn stats(&self) -> AnnotationStats {
        self.snapshot().stats()
    }

    pub fn person_stats(&self, person: &PersonId) -> PersonStats {
        self.snapshot().person_stats(person)
    }

    // ---- video -----------------------------------------------------------

    /// Reset everything for a newly loaded video.
    pub fn load_video(&mut self, info: VideoInfo) {
        self.tx.send_replace(Arc::new(AnnotationState::for_video(info)));
    }

    pub fn apply_crop(&mut self, bounds: CropBounds) {
        self.apply(|s| s.apply_crop(bounds))
    }

    // ---- frames ----------------------------------------------------------

    /// Move to `frame`, clamped to the video.
    pub fn go_to_frame(&mut self, frame: u64) -> u64 {
        self.apply(|s| s.go_to_frame(frame))
    }

    pub fn next_frame(&mut self) -> u64 {
        let current = self.snapshot().current_frame;
        self.go_to_frame(current.saturating_add(1))
    }

    pub fn prev_frame(&mut self) -> u64 {
        let current = self.snapshot().current_frame;
        self.go_to_frame(current.saturating_sub(1))
    }

    // ---- annotations -----------------------------------------------------

    pub fn add_annotation(
        &mut self,
        frame: u64,
        person: &PersonId,
        keypoint: KeypointId,
        position: Position,
    ) -> ValidationResult<()> {
        self.edit(|s| s.add_annotation(frame, person, keypoint, position))
    }

    /// Annotate the selected keypoint on the current frame and advance the
    /// selection. Returns `(annotated, next)`.
    pub fn annotate_selected(&mut self, position: Position) -> ValidationResult<(KeypointId, KeypointId)> {
        self.edit(|s| s.annotate_selected(position))
    }

    pub fn remove_annotation(&mut self, frame: u64, person: &PersonId, keypoint: KeypointId) {
        self.apply(|s| s.remove_annotation(frame, person, keypoint))
    }

    pub fn clear_frame(&mut self, frame: u64) {
        self.apply(|s| s.clear_frame(frame))
    }

    pub fn copy_frame(&mut self, source: u64, target: u64) -> ValidationResult<()> {
        self.edit(|s| s.copy_frame(source, target))
    }

    // ---- persons ---------------------------------------------------------

    pub fn create_person(&mut self, name: &str, policy: NamePolicy) -> ValidationResult<Person> {
        self.edit(|s| s.create_person(name, policy))
    }

    pub fn edit_person(&mut self, id: &PersonId, update: PersonUpdate) -> ValidationResult<Person> {
        self.edit(|s| s.edit_person(id, update))
    }

    pub fn delete_person(&mut self, id: &PersonId) -> ValidationResult<Person> {
        self.edit(|s| s.delete_person(id))
    }

    // ---- selection -------------------------------------------------------

    pub fn select_person(&mut self, id: Option<&PersonId>) -> ValidationResult<()> {
        self.edit(|s| s.select_person(id))
    }

    pub fn set_selected_keypoint(&mut self, keypoint: Option<KeypointId>) -> ValidationResult<()> {
        self.edit(|s| s.set_selected_keypoint(keypoint))
    }

    pub fn select_person_and_switch_tab(&mut self, id: &PersonId) -> ValidationResult<()> {
        self.edit(|s| s.select_person_and_switch_tab(id))
    }

    pub fn cycle_keypoint(&mut self, direction: CycleDirection) -> ValidationResult<KeypointId> {
        self.edit(|s| s.cycle_keypoint(direction))
    }

    pub fn set_active_tab(&mut self, tab: Tab) {
        self.apply(|s| s.set_active_tab(tab))
    }

    /// Tab-key cycling.
    pub fn next_tab(&mut self) -> Tab {
        self.apply(|s| {
            s.set_active_tab(s.selection.tab.next());
            s.selection.tab
        })
    }

    // ---- bulk ------------------------------------------------------------

    /// Merge one frame of inference results.
    pub fn apply_inference(&mut self, result: &FrameResult) -> ReconcileReport {
        self.apply(|s| reconcile(s, result))
    }

    /// Replace persons and annotations with an imported document.
    pub fn import(&mut self, snapshot: ImportedSnapshot) {
        self.apply(|s| s.replace_all(snapshot.persons, snapshot.annotations, snapshot.video_info))
    }
}
