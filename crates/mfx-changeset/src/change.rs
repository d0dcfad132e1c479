// change.rs — The opaque edit behind a change unit.
//
// The engine never looks inside an edit. It only needs to know which files
// an edit touches (for previews and merge bookkeeping) and how to apply or
// revert it. Concrete edit types live with whatever text/diff mechanism the
// caller uses.
//
// CompositeChange is the merge of all accepted edits for one session. It is
// applied exactly once, and it rolls back its already-applied prefix if a
// later part fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a file taking part in a transformation batch
/// (e.g., a workspace-relative path or a `fs://` URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Errors reported by an edit application mechanism.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A file I/O operation failed.
    #[error("I/O error at {file}: {source}")]
    Io {
        file: FileId,
        source: std::io::Error,
    },

    /// The file no longer matches what the edit was computed against.
    #[error("conflict in {file}: {reason}")]
    Conflict { file: FileId, reason: String },

    /// The change was applied twice, or reverted without being applied.
    #[error("invalid apply state: {0}")]
    InvalidState(String),

    /// Any other failure reported by the underlying mechanism.
    #[error("apply failed: {0}")]
    Failed(String),

    /// A part failed and rolling back the earlier parts failed too.
    #[error("apply failed ({source}) and rollback failed ({rollback})")]
    RollbackFailed {
        source: Box<ApplyError>,
        rollback: Box<ApplyError>,
    },
}

/// An opaque file modification with undo support.
///
/// Implementations own whatever state they need to undo themselves
/// (original bytes, inverse patch, etc.).
pub trait Change: fmt::Debug + Send + Sync {
    /// Files this change modifies, in a stable order.
    fn affected_files(&self) -> Vec<FileId>;

    /// Apply the change. Must have no partial effect on failure.
    fn apply(&mut self) -> Result<(), ApplyError>;

    /// Undo a previously applied change.
    fn revert(&mut self) -> Result<(), ApplyError>;
}

/// Several changes merged into one apply-as-one-unit change.
#[derive(Debug, Default)]
pub struct CompositeChange {
    label: String,
    parts: Vec<Box<dyn Change>>,
    /// Number of leading parts currently applied.
    applied: usize,
    /// Set by a successful `apply`, cleared by `revert`.
    complete: bool,
}

impl CompositeChange {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parts: Vec::new(),
            applied: 0,
            complete: false,
        }
    }

    /// Append a part. Parts are applied in insertion order.
    pub fn push(&mut self, part: Box<dyn Change>) {
        self.parts.push(part);
    }

    /// Append a part and return self (builder pattern).
    pub fn with_part(mut self, part: Box<dyn Change>) -> Self {
        self.push(part);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn is_applied(&self) -> bool {
        self.complete
    }

    /// Undo the first `count` parts in reverse order.
    fn rollback(&mut self, count: usize) -> Result<(), ApplyError> {
        for part in self.parts[..count].iter_mut().rev() {
            part.revert()?;
        }
        Ok(())
    }
}

impl Change for CompositeChange {
    fn affected_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = Vec::new();
        for file in self.parts.iter().flat_map(|p| p.affected_files()) {
            if !files.contains(&file) {
                files.push(file);
            }
        }
        files
    }

    fn apply(&mut self) -> Result<(), ApplyError> {
        if self.complete || self.applied > 0 {
            return Err(ApplyError::InvalidState(format!(
                "'{}' is already applied",
                self.label
            )));
        }

        for index in 0..self.parts.len() {
            if let Err(source) = self.parts[index].apply() {
                tracing::warn!(
                    change = %self.label,
                    part = index,
                    error = %source,
                    "composite apply failed, rolling back"
                );
                return match self.rollback(index) {
                    Ok(()) => {
                        self.applied = 0;
                        Err(source)
                    }
                    Err(rollback) => Err(ApplyError::RollbackFailed {
                        source: Box::new(source),
                        rollback: Box::new(rollback),
                    }),
                };
            }
            self.applied = index + 1;
        }
        self.complete = true;
        Ok(())
    }

    fn revert(&mut self) -> Result<(), ApplyError> {
        if !self.complete {
            return Err(ApplyError::InvalidState(format!(
                "'{}' has not been applied",
                self.label
            )));
        }
        self.rollback(self.applied)?;
        self.applied = 0;
        self.complete = false;
        Ok(())
    }
}
