//! The annotation state and its transitions.
//!
//! [`AnnotationState`] is plain data. Every transition validates first and
//! mutates second, so a rejected operation leaves the value untouched; the
//! store relies on this to publish each accepted transition as one new
//! snapshot.

use posemark_models::catalog::{
    first_keypoint, is_known_keypoint, next_keypoint, person_color, prev_keypoint, MAX_PERSONS,
};
use posemark_models::person::validate_person_name;
use posemark_models::{
    AnnotationStats, Annotations, CropBounds, KeypointId, Person, PersonId, PersonList,
    PersonStats, PersonUpdate, Position, Tab, ValidationError, ValidationResult, VideoInfo,
};
use tracing::{debug, warn};

use crate::store::{CycleDirection, NamePolicy};

/// What the user is pointing at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub person: Option<PersonId>,
    pub keypoint: Option<KeypointId>,
    pub tab: Tab,
}

/// One consistent view of persons, annotations, selection and frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationState {
    pub persons: PersonList,
    pub annotations: Annotations,
    pub selection: Selection,
    pub current_frame: u64,
    pub total_frames: u64,
    /// Displayed video metadata; carries original dimensions when cropped
    pub video: Option<VideoInfo>,
    /// Crop applied to displayed frames, in original pixels
    pub crop: Option<CropBounds>,
    /// Lower bound for the next allocated person id
    next_person_id: u64,
}

impl Default for AnnotationState {
    fn default() -> Self {
        Self {
            persons: PersonList::new(),
            annotations: Annotations::new(),
            selection: Selection::default(),
            current_frame: 0,
            total_frames: 0,
            video: None,
            crop: None,
            next_person_id: 1,
        }
    }
}

impl AnnotationState {
    pub fn selected_person(&self) -> Option<&Person> {
        self.selection
            .person
            .as_ref()
            .and_then(|id| self.persons.get(id))
    }

    /// Original (uncropped) frame size, once a video is loaded.
    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.video.as_ref().map(VideoInfo::original_dimensions)
    }

    pub fn stats(&self) -> AnnotationStats {
        self.annotations
            .stats(self.total_frames, self.persons.len())
    }

    pub fn person_stats(&self, person: &PersonId) -> PersonStats {
        self.annotations.person_stats(person)
    }

    // ---- video -----------------------------------------------------------

    /// Fresh state for a newly loaded video.
    pub fn for_video(info: VideoInfo) -> Self {
        Self {
            total_frames: info.total_frames(),
            video: Some(info),
            ..Self::default()
        }
    }

    /// Record the crop applied to displayed frames.
    pub fn apply_crop(&mut self, bounds: CropBounds) {
        if let Some(video) = self.video.as_mut() {
            if !video.is_cropped() {
                *video = video.with_crop(&bounds);
            }
        }
        self.crop = Some(bounds);
    }

    // ---- frames ----------------------------------------------------------

    /// Move to `frame`, clamped to the video. Returns the frame moved to.
    pub fn go_to_frame(&mut self, frame: u64) -> u64 {
        self.current_frame = self.clamp_frame(frame);
        self.current_frame
    }

    pub fn clamp_frame(&self, frame: u64) -> u64 {
        if self.total_frames > 0 {
            frame.min(self.total_frames - 1)
        } else {
            frame
        }
    }

    // ---- annotations -----------------------------------------------------

    /// Record `position` for `(frame, person, keypoint)`, overwriting any
    /// previous value.
    pub fn add_annotation(
        &mut self,
        frame: u64,
        person: &PersonId,
        keypoint: KeypointId,
        position: Position,
    ) -> ValidationResult<()> {
        if !self.persons.contains(person) {
            warn!(person_id = %person, "Rejected annotation for unknown person");
            return Err(ValidationError::UnknownPerson(person.clone()));
        }
        if !is_known_keypoint(keypoint) {
            warn!(keypoint, "Rejected annotation for unknown keypoint");
            return Err(ValidationError::UnknownKeypoint(keypoint));
        }
        if self.total_frames > 0 && frame >= self.total_frames {
            return Err(ValidationError::FrameOutOfRange {
                frame,
                total: self.total_frames,
            });
        }
        if let Some((width, height)) = self.frame_dimensions() {
            let inside = position.x.is_finite()
                && position.y.is_finite()
                && (0.0..=f64::from(width)).contains(&position.x)
                && (0.0..=f64::from(height)).contains(&position.y);
            if !inside {
                return Err(ValidationError::OutOfBounds {
                    x: position.x,
                    y: position.y,
                    width,
                    height,
                });
            }
        }

        self.annotations = self
            .annotations
            .with_annotation(frame, person, keypoint, position);
        Ok(())
    }

    /// Annotate the selected keypoint of the selected person on the current
    /// frame, then advance to the next keypoint. Returns `(annotated, next)`.
    pub fn annotate_selected(&mut self, position: Position) -> ValidationResult<(KeypointId, KeypointId)> {
        let person = self
            .selection
            .person
            .clone()
            .ok_or(ValidationError::missing_selection("person"))?;
        let keypoint = self
            .selection
            .keypoint
            .ok_or(ValidationError::missing_selection("keypoint"))?;

        self.add_annotation(self.current_frame, &person, keypoint, position)?;

        let next = next_keypoint(Some(keypoint));
        self.selection.keypoint = Some(next);
        Ok((keypoint, next))
    }

    pub fn remove_annotation(&mut self, frame: u64, person: &PersonId, keypoint: KeypointId) {
        self.annotations = self
            .annotations
            .without_annotation(frame, person, keypoint);
    }

    pub fn clear_frame(&mut self, frame: u64) {
        self.annotations = self.annotations.without_frame(frame);
    }

    /// Replace frame `target` with the contents of frame `source`.
    pub fn copy_frame(&mut self, source: u64, target: u64) -> ValidationResult<()> {
        if self.total_frames > 0 && target >= self.total_frames {
            return Err(ValidationError::FrameOutOfRange {
                frame: target,
                total: self.total_frames,
            });
        }
        self.annotations = self.annotations.with_frame_copied(source, target);
        Ok(())
    }

    // ---- persons ---------------------------------------------------------

    /// Create a person, select it and switch to the keypoints tab.
    pub fn create_person(&mut self, name: &str, policy: NamePolicy) -> ValidationResult<Person> {
        if self.persons.len() >= MAX_PERSONS {
            return Err(ValidationError::TooManyPersons(MAX_PERSONS));
        }

        let name = validate_person_name(name)?;
        let name = match policy {
            NamePolicy::AutoSuffix => validate_person_name(&self.persons.unique_name(&name))?,
            NamePolicy::Reject if !self.persons.is_name_unique(&name, None) => {
                return Err(ValidationError::DuplicateName(name));
            }
            NamePolicy::Reject => name,
        };

        let id = self.allocate_person_id();
        let person = Person::new(id, name, person_color(self.persons.len()));
        self.insert_person(person.clone());

        self.selection = Selection {
            person: Some(person.id.clone()),
            keypoint: Some(first_keypoint()),
            tab: Tab::Keypoints,
        };

        debug!(person_id = %person.id, name = %person.name, "Person created");
        Ok(person)
    }

    pub(crate) fn allocate_person_id(&self) -> PersonId {
        self.persons.allocate_id(self.next_person_id)
    }

    /// Add an already-identified person, keeping the id counter ahead of it.
    pub(crate) fn insert_person(&mut self, person: Person) {
        if let Some(n) = person.id.numeric() {
            self.next_person_id = self.next_person_id.max(n + 1);
        }
        self.persons.push(person);
    }

    /// Apply a shallow update. Renames must stay unique.
    pub fn edit_person(&mut self, id: &PersonId, update: PersonUpdate) -> ValidationResult<Person> {
        if !self.persons.contains(id) {
            return Err(ValidationError::UnknownPerson(id.clone()));
        }

        let name = match update.name.as_deref() {
            Some(raw) => {
                let name = validate_person_name(raw)?;
                if !self.persons.is_name_unique(&name, Some(id)) {
                    return Err(ValidationError::DuplicateName(name));
                }
                Some(name)
            }
            None => None,
        };

        let person = self
            .persons
            .get_mut(id)
            .ok_or_else(|| ValidationError::UnknownPerson(id.clone()))?;
        if let Some(name) = name {
            person.name = name;
        }
        if let Some(color) = update.color {
            person.color = color;
        }
        Ok(person.clone())
    }

    /// Remove a person and every annotation that references them.
    pub fn delete_person(&mut self, id: &PersonId) -> ValidationResult<Person> {
        let removed = self
            .persons
            .remove(id)
            .ok_or_else(|| ValidationError::UnknownPerson(id.clone()))?;

        self.annotations = self.annotations.without_person(id);
        if self.selection.person.as_ref() == Some(id) {
            self.selection.person = None;
            self.selection.keypoint = None;
        }

        debug!(person_id = %id, "Person deleted");
        Ok(removed)
    }

    // ---- selection -------------------------------------------------------

    pub fn select_person(&mut self, id: Option<&PersonId>) -> ValidationResult<()> {
        if let Some(id) = id {
            if !self.persons.contains(id) {
                return Err(ValidationError::UnknownPerson(id.clone()));
            }
        }
        self.selection.person = id.cloned();
        Ok(())
    }

    pub fn set_selected_keypoint(&mut self, keypoint: Option<KeypointId>) -> ValidationResult<()> {
        if let Some(k) = keypoint {
            if !is_known_keypoint(k) {
                return Err(ValidationError::UnknownKeypoint(k));
            }
        }
        self.selection.keypoint = keypoint;
        Ok(())
    }

    /// Select a person for annotating: switch to the keypoints tab and start
    /// at the first keypoint unless the person was already selected.
    pub fn select_person_and_switch_tab(&mut self, id: &PersonId) -> ValidationResult<()> {
        if !self.persons.contains(id) {
            return Err(ValidationError::UnknownPerson(id.clone()));
        }

        let same_person = self.selection.person.as_ref() == Some(id);
        if !same_person || self.selection.keypoint.is_none() {
            self.selection.keypoint = Some(first_keypoint());
        }
        self.selection.person = Some(id.clone());
        self.selection.tab = Tab::Keypoints;
        Ok(())
    }

    /// Step the selected keypoint through the catalog. Needs a selected person.
    pub fn cycle_keypoint(&mut self, direction: CycleDirection) -> ValidationResult<KeypointId> {
        if self.selected_person().is_none() {
            return Err(ValidationError::missing_selection("person"));
        }
        let next = match direction {
            CycleDirection::Next => next_keypoint(self.selection.keypoint),
            CycleDirection::Previous => prev_keypoint(self.selection.keypoint),
        };
        self.selection.keypoint = Some(next);
        Ok(next)
    }

    /// Switch tabs. Entering the keypoints tab with a person selected and no
    /// keypoint picks the first keypoint.
    pub fn set_active_tab(&mut self, tab: Tab) {
        self.selection.tab = tab;
        if tab == Tab::Keypoints
            && self.selected_person().is_some()
            && self.selection.keypoint.is_none()
        {
            self.selection.keypoint = Some(first_keypoint());
        }
    }

    // ---- bulk ------------------------------------------------------------

    /// Swap in imported persons and annotations. Selection resets; the
    /// video stays unless the import carries its own metadata.
    pub fn replace_all(&mut self, persons: PersonList, annotations: Annotations, video: Option<VideoInfo>) {
        self.next_person_id = persons.max_numeric_id().map_or(1, |max| max + 1);
        self.annotations = annotations.retain_persons(&persons);
        self.persons = persons;
        self.selection = Selection::default();

        if self.video.is_none() {
            if let Some(info) = video {
                self.total_frames = info.total_frames();
                self.video = Some(info);
            }
        }
        self.current_frame = self.clamp_frame(self.current_frame);
    }
}
