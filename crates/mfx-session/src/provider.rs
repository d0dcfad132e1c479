//! Core TransformationProvider trait and outcome types

use std::sync::Arc;

use mfx_changeset::{Change, ChangeSetError, ChangeUnit};

use crate::cancel::CancellationToken;
use crate::error::ProviderError;

/// What a provider proposes for a batch of files.
#[derive(Debug)]
pub enum ProviderOutcome {
    /// Nothing to change.
    NoChange,

    /// One edit that must be accepted or rejected as a whole.
    Atomic {
        description: String,
        edit: Box<dyn Change>,
    },

    /// Individually selectable units with declared dependents.
    Units(Vec<ChangeUnit>),
}

impl ProviderOutcome {
    pub fn atomic(description: impl Into<String>, edit: Box<dyn Change>) -> Self {
        ProviderOutcome::Atomic {
            description: description.into(),
            edit,
        }
    }

    /// Normalize into change units. An atomic edit becomes exactly one
    /// independent unit with no dependents.
    pub fn into_units(self) -> Result<Vec<ChangeUnit>, ChangeSetError> {
        match self {
            ProviderOutcome::NoChange => Ok(Vec::new()),
            ProviderOutcome::Atomic { description, edit } => {
                Ok(vec![ChangeUnit::new(description, edit)?])
            }
            ProviderOutcome::Units(units) => Ok(units),
        }
    }
}

/// Pluggable logic that analyzes a batch of files and proposes edits.
///
/// Providers are handed in explicitly by the caller; there is no global
/// registry. `produce` and `recompute` must be read-only with respect to file
/// contents. Any error they return drops only this provider's contribution.
pub trait TransformationProvider<C>: Send + Sync {
    /// Provider display name (for warnings and logs).
    fn name(&self) -> &str;

    /// Propose edits for `contexts`, one per distinct file, in batch order.
    fn produce(
        &self,
        contexts: &[Arc<C>],
        cancel: &CancellationToken,
    ) -> Result<ProviderOutcome, ProviderError>;

    /// Whether un-accepted units must be regenerated after a selection round
    /// that rejected some of this provider's units.
    fn requires_recompute_after_selection(&self) -> bool {
        false
    }

    /// Regenerate proposals against contexts that reflect the accepted units.
    ///
    /// The default ignores `accepted` and runs a full `produce`; providers
    /// doing differential recomputation override it.
    fn recompute(
        &self,
        fresh_contexts: &[Arc<C>],
        accepted: &[&ChangeUnit],
        cancel: &CancellationToken,
    ) -> Result<ProviderOutcome, ProviderError> {
        let _ = accepted;
        self.produce(fresh_contexts, cancel)
    }

    /// Whether this provider needs its own contexts instead of the batch's
    /// shared ones.
    fn requires_private_contexts(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfx_changeset::{ApplyError, FileId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Noop;

    impl Change for Noop {
        fn affected_files(&self) -> Vec<FileId> {
            vec![FileId::from("a.rs")]
        }
        fn apply(&mut self) -> Result<(), ApplyError> {
            Ok(())
        }
        fn revert(&mut self) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    struct Counting {
        calls: AtomicUsize,
    }

    impl TransformationProvider<()> for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn produce(
            &self,
            _contexts: &[Arc<()>],
            _cancel: &CancellationToken,
        ) -> Result<ProviderOutcome, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderOutcome::NoChange)
        }
    }

    #[test]
    fn atomic_outcome_wraps_into_one_independent_unit() {
        let units = ProviderOutcome::atomic("reformat", Box::new(Noop))
            .into_units()
            .unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].is_independent());
        assert_eq!(units[0].description(), "reformat");
    }

    #[test]
    fn atomic_outcome_requires_description() {
        let result = ProviderOutcome::atomic("", Box::new(Noop)).into_units();
        assert!(matches!(result, Err(ChangeSetError::EmptyDescription)));
    }

    #[test]
    fn no_change_yields_no_units() {
        assert!(ProviderOutcome::NoChange.into_units().unwrap().is_empty());
    }

    #[test]
    fn default_capabilities() {
        let provider = Counting {
            calls: AtomicUsize::new(0),
        };
        assert!(!provider.requires_recompute_after_selection());
        assert!(!provider.requires_private_contexts());
    }

    #[test]
    fn default_recompute_delegates_to_produce() {
        let provider = Counting {
            calls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();

        provider.recompute(&[Arc::new(())], &[], &cancel).unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
