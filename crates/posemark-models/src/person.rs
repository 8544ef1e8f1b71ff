//! Persons and the ordered person registry.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::{ValidationError, ValidationResult};

/// Maximum person name length, in characters.
pub const MAX_NAME_LEN: usize = 50;

/// Identifier of a tracked person.
///
/// Interactively created persons get numeric ids ("1", "2", ...); persons
/// introduced by inference or import may carry arbitrary strings.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct PersonId(pub String);

impl PersonId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, if it is a plain non-negative integer.
    pub fn numeric(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PersonId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for PersonId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// A tracked person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub color: Rgb,
}

impl Person {
    pub fn new(id: impl Into<PersonId>, name: impl Into<String>, color: Rgb) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color,
        }
    }
}

/// Shallow field updates for an existing person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersonUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

impl PersonUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            color: None,
        }
    }

    pub fn color(color: Rgb) -> Self {
        Self {
            name: None,
            color: Some(color),
        }
    }
}

/// Validate a person name, returning the trimmed name.
pub fn validate_person_name(name: &str) -> ValidationResult<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong { max: MAX_NAME_LEN });
    }
    if !trimmed.chars().all(is_allowed_name_char) {
        return Err(ValidationError::InvalidNameCharacters);
    }

    Ok(trimmed.to_string())
}

fn is_allowed_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_whitespace()
        || c == '_'
        || c == '-'
        || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Persons in insertion order, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PersonList(Vec<Person>);

impl PersonList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Person> {
        self.0.iter()
    }

    pub fn get(&self, id: &PersonId) -> Option<&Person> {
        self.0.iter().find(|p| &p.id == id)
    }

    pub fn get_mut(&mut self, id: &PersonId) -> Option<&mut Person> {
        self.0.iter_mut().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.get(id).is_some()
    }

    /// Case-insensitive name lookup.
    pub fn find_by_name(&self, name: &str) -> Option<&Person> {
        let wanted = name.trim().to_lowercase();
        self.0.iter().find(|p| p.name.to_lowercase() == wanted)
    }

    /// Append a person. The caller guarantees the id is not already present.
    pub fn push(&mut self, person: Person) {
        debug_assert!(!self.contains(&person.id));
        self.0.push(person);
    }

    /// Remove a person by id, returning it.
    pub fn remove(&mut self, id: &PersonId) -> Option<Person> {
        let index = self.0.iter().position(|p| &p.id == id)?;
        Some(self.0.remove(index))
    }

    /// Whether `name` is unused (case-insensitively), ignoring `exclude`.
    pub fn is_name_unique(&self, name: &str, exclude: Option<&PersonId>) -> bool {
        let wanted = name.trim().to_lowercase();
        !self
            .0
            .iter()
            .filter(|p| Some(&p.id) != exclude)
            .any(|p| p.name.to_lowercase() == wanted)
    }

    /// `base` if unused, otherwise the first free `base_1`, `base_2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        let base = base.trim();
        if self.is_name_unique(base, None) {
            return base.to_string();
        }
        (1u64..)
            .map(|n| {
                let suffix = format!("_{}", n);
                // Shorten the base so the suffixed name still fits
                let keep = MAX_NAME_LEN.saturating_sub(suffix.len());
                let stem: String = base.chars().take(keep).collect();
                format!("{}{}", stem.trim_end(), suffix)
            })
            .find(|candidate| self.is_name_unique(candidate, None))
            .unwrap_or_else(|| base.to_string())
    }

    /// Largest numeric id present.
    pub fn max_numeric_id(&self) -> Option<u64> {
        self.0.iter().filter_map(|p| p.id.numeric()).max()
    }

    /// Allocate a fresh numeric id.
    ///
    /// Starts at `max(existing numeric ids) + 1` (never below `floor`), then
    /// bumps past any id already in the list.
    pub fn allocate_id(&self, floor: u64) -> PersonId {
        let mut candidate = self
            .max_numeric_id()
            .map(|max| max + 1)
            .unwrap_or(1)
            .max(floor);
        while self.contains(&PersonId::from(candidate)) {
            candidate += 1;
        }
        PersonId::from(candidate)
    }
}

impl FromIterator<Person> for PersonList {
    fn from_iter<I: IntoIterator<Item = Person>>(iter: I) -> Self {
        let mut list = Self::new();
        for person in iter {
            if !list.contains(&person.id) {
                list.push(person);
            }
        }
        list
    }
}

impl<'a> IntoIterator for &'a PersonList {
    type Item = &'a Person;
    type IntoIter = std::slice::Iter<'a, Person>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
