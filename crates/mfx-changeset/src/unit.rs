// unit.rs — ChangeUnit: one independently selectable proposed edit.
//
// Providers build units during produce/recompute and wire up dependents
// while constructing them. Once handed to a session a unit is immutable;
// the accept/reject flag lives in the session, not on the unit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::{Change, FileId};
use crate::error::ChangeSetError;

/// Opaque identity of a change unit, stable across recompute rounds within
/// one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single proposed edit plus the units that require it.
///
/// `dependents` is a back-reference list: a unit does not own its
/// dependents, it only names them. A unit is independent exactly when
/// nothing depends on it.
#[derive(Debug)]
pub struct ChangeUnit {
    id: UnitId,
    description: String,
    edit: Box<dyn Change>,
    dependents: Vec<UnitId>,
    created_at: DateTime<Utc>,
}

impl ChangeUnit {
    /// Create a unit with a fresh id and no dependents.
    pub fn new(
        description: impl Into<String>,
        edit: Box<dyn Change>,
    ) -> Result<Self, ChangeSetError> {
        Self::with_id(UnitId::new(), description, edit)
    }

    /// Create a unit with a caller-chosen id (lets a provider reference a
    /// unit before constructing it).
    pub fn with_id(
        id: UnitId,
        description: impl Into<String>,
        edit: Box<dyn Change>,
    ) -> Result<Self, ChangeSetError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(ChangeSetError::EmptyDescription);
        }
        Ok(Self {
            id,
            description,
            edit,
            dependents: Vec::new(),
            created_at: Utc::now(),
        })
    }

    /// Record that `dependent` requires this unit. Returns false if it was
    /// already recorded.
    pub fn add_dependent(&mut self, dependent: UnitId) -> bool {
        if self.dependents.contains(&dependent) {
            return false;
        }
        self.dependents.push(dependent);
        true
    }

    /// Add a dependent and return self (builder pattern).
    pub fn with_dependent(mut self, dependent: UnitId) -> Self {
        self.add_dependent(dependent);
        self
    }

    /// Forget a dependent. Returns false if it was not recorded.
    pub fn remove_dependent(&mut self, dependent: UnitId) -> bool {
        let before = self.dependents.len();
        self.dependents.retain(|d| *d != dependent);
        self.dependents.len() != before
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dependents(&self) -> &[UnitId] {
        &self.dependents
    }

    pub fn is_independent(&self) -> bool {
        self.dependents.is_empty()
    }

    pub fn edit(&self) -> &dyn Change {
        self.edit.as_ref()
    }

    /// Give up the unit and take ownership of its edit.
    pub fn into_edit(self) -> Box<dyn Change> {
        self.edit
    }

    pub fn affected_files(&self) -> Vec<FileId> {
        self.edit.affected_files()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serializable view of this unit for review surfaces.
    pub fn summary(&self) -> UnitSummary {
        UnitSummary {
            id: self.id,
            description: self.description.clone(),
            independent: self.is_independent(),
            dependents: self.dependents.clone(),
            files: self.affected_files(),
            created_at: self.created_at,
        }
    }
}

/// A read-only, serializable description of a [`ChangeUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub id: UnitId,
    pub description: String,
    pub independent: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<UnitId>,
    pub files: Vec<FileId>,
    pub created_at: DateTime<Utc>,
}
