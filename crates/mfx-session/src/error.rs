// error.rs — Error types for the session subsystem.

use std::path::PathBuf;

use mfx_changeset::{ApplyError, ChangeSetError, DependencyPair, FileId, UnitId};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building the analysis context for a file.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// The file could not be analyzed.
    #[error("cannot analyze {file}: {reason}")]
    Unavailable { file: FileId, reason: String },

    /// Analysis was cancelled before it completed.
    #[error("analysis cancelled")]
    Cancelled,
}

/// Errors a transformation provider may report from produce/recompute.
///
/// None of these are fatal to a batch: the engine drops the provider's
/// contribution for the round and records a warning.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call observed a cancellation signal.
    #[error("cancelled")]
    Cancelled,

    /// The provider could not obtain the contexts it needed.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// The provider returned units that do not form a valid batch
    /// (empty description, dependency cycle, dangling dependent, ...).
    #[error("invalid provider output: {0}")]
    InvalidOutput(#[from] ChangeSetError),

    /// Any provider-specific failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors loading session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors surfaced to the caller of a batch run or a selection session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A batch run needs at least one file.
    #[error("no files supplied to the batch")]
    NoFiles,

    /// The same file was supplied twice.
    #[error("duplicate file in batch: {0}")]
    DuplicateFile(FileId),

    /// The shared analysis contexts could not be built.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// The operation is not allowed in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A selection named a unit that is not part of the current round.
    #[error("unit {0} is not part of the current round")]
    UnknownUnit(UnitId),

    /// The selection accepts units whose dependents were rejected.
    #[error("selection violates {} dependency pair(s)", .pairs.len())]
    DependencyViolation { pairs: Vec<DependencyPair> },

    /// A provider kept asking for recomputation past the configured cap.
    #[error("recompute did not settle within {max_rounds} round(s)")]
    RecomputeLoopExceeded { max_rounds: u32 },

    /// The merged change could not be applied.
    #[error("apply failed for session {session_id}: {source}")]
    ApplyFailure {
        session_id: Uuid,
        source: ApplyError,
    },
}
