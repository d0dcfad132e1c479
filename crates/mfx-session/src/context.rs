// context.rs — Boundary to the external source analyzer.
//
// The engine never inspects an analysis context. It builds one per file,
// shares it read-only across providers, and passes it through.

use std::sync::Arc;

use mfx_changeset::{ChangeUnit, FileId};

use crate::error::ContextError;

/// Builds per-file analysis contexts of type `C`.
pub trait ContextSource<C>: Send + Sync {
    /// Analyze a file as it currently is.
    fn analyze(&self, file: &FileId) -> Result<C, ContextError>;

    /// Analyze a file as it would be after `applied` units took effect.
    ///
    /// Used to build fresh contexts for recompute rounds. The default
    /// re-analyzes the file and ignores `applied`; sources that can model
    /// pending edits should override it.
    fn refresh(&self, file: &FileId, applied: &[&ChangeUnit]) -> Result<C, ContextError> {
        let _ = applied;
        self.analyze(file)
    }
}

/// Analyze every file, in order.
pub(crate) fn analyze_all<C>(
    source: &dyn ContextSource<C>,
    files: &[FileId],
) -> Result<Vec<Arc<C>>, ContextError> {
    files
        .iter()
        .map(|file| source.analyze(file).map(Arc::new))
        .collect()
}

/// Refresh every file against the hypothetically-applied units, in order.
pub(crate) fn refresh_all<C>(
    source: &dyn ContextSource<C>,
    files: &[FileId],
    applied: &[&ChangeUnit],
) -> Result<Vec<Arc<C>>, ContextError> {
    files
        .iter()
        .map(|file| source.refresh(file, applied).map(Arc::new))
        .collect()
}
