// session.rs — SelectionSession: the accept/reject/recompute state machine.
//
// A session owns every proposed ChangeUnit for one transformation request,
// the dependency graph built from them, and the reviewer's accept flags.
//
// The state machine:
//   Initial → AwaitingSelection → Ready → Finalized
//                   ↑       ↓
//                   └─ Recomputing
//   Initial → Empty (nothing proposed), Recomputing → Empty (nothing left)
//   AwaitingSelection → Failed (recompute cap exceeded)
//
// Nothing touches the files until `apply`, which merges the accepted edits
// into one CompositeChange and applies it exactly once.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mfx_changeset::{
    Change, ChangeUnit, CompositeChange, Consistency, DependencyGraph, FileId, UnitId, UnitSummary,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cancel::{CancellationExt, CancellationToken};
use crate::config::SessionConfig;
use crate::context::{refresh_all, ContextSource};
use crate::coordinator::fan_out;
use crate::error::{ProviderError, SessionError};
use crate::provider::{ProviderOutcome, TransformationProvider};
use crate::report::{ProviderWarning, SessionReport};

/// Lifecycle state of a selection session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Providers are still producing the first round.
    Initial,
    /// Units are proposed and the session waits for a selection.
    AwaitingSelection,
    /// Rejected units are being regenerated.
    Recomputing,
    /// The selection is final and can be applied.
    Ready,
    /// The accepted edits were merged and handed to the apply mechanism.
    Finalized,
    /// Nothing to apply.
    Empty,
    /// The session hit an unrecoverable error; nothing was applied.
    Failed { reason: String },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Initial => write!(f, "initial"),
            SessionState::AwaitingSelection => write!(f, "awaiting_selection"),
            SessionState::Recomputing => write!(f, "recomputing"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Finalized => write!(f, "finalized"),
            SessionState::Empty => write!(f, "empty"),
            SessionState::Failed { .. } => write!(f, "failed"),
        }
    }
}

impl SessionState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Finalized | SessionState::Empty | SessionState::Failed { .. }
        )
    }
}

/// A reviewer's decision for one round: the accepted unit ids, plus whether
/// dependency warnings were explicitly overridden.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    accepted: HashSet<UnitId>,
    override_violations: bool,
}

impl Selection {
    pub fn new(accepted: impl IntoIterator<Item = UnitId>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
            override_violations: false,
        }
    }

    /// Accept the selection even if it leaves dependents behind.
    pub fn with_override(mut self) -> Self {
        self.override_violations = true;
        self
    }

    pub fn accepted(&self) -> &HashSet<UnitId> {
        &self.accepted
    }

    pub fn overrides_violations(&self) -> bool {
        self.override_violations
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.accepted.contains(&id)
    }
}

/// Where a successful `submit_selection` left the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The session is ready to apply `accepted` units.
    Ready { accepted: usize },
    /// A recompute round ran; a new selection is needed.
    Recomputed { round: u32, units: usize },
    /// Nothing was accepted and nothing remains to propose.
    NothingToApply,
}

/// The merged, applied result of a finalized session.
#[derive(Debug)]
pub struct FinalizedChange {
    pub session_id: Uuid,
    /// The applied change. Callers may `revert` it to undo the session.
    pub change: CompositeChange,
    /// The units whose edits were merged, in session order.
    pub units: Vec<UnitSummary>,
    /// Recompute rounds the session went through.
    pub rounds: u32,
}

impl FinalizedChange {
    pub fn affected_files(&self) -> Vec<FileId> {
        self.change.affected_files()
    }
}

/// A unit held by the session, tagged with its provider slot.
///
/// `locked` units were accepted in an earlier round. Later rounds were
/// computed against them, so they stay accepted until the session ends.
#[derive(Debug)]
struct SessionUnit {
    unit: ChangeUnit,
    slot: usize,
    accepted: bool,
    locked: bool,
}

/// Stateful orchestrator for one accept/reject/recompute workflow.
///
/// All mutation goes through `&mut self`, so a round in flight can never
/// overlap another selection. Wrap the session in a `Mutex` to share it
/// between threads.
pub struct SelectionSession<C> {
    session_id: Uuid,
    state: SessionState,
    round: u32,
    config: SessionConfig,
    source: Arc<dyn ContextSource<C>>,
    files: Vec<FileId>,
    providers: Vec<Arc<dyn TransformationProvider<C>>>,
    units: Vec<SessionUnit>,
    graph: DependencyGraph,
    warnings: Vec<ProviderWarning>,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

impl<C> fmt::Debug for SelectionSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionSession")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("round", &self.round)
            .field("files", &self.files)
            .field("units", &self.units)
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl<C: Send + Sync + 'static> SelectionSession<C> {
    /// Build a session from the first round of provider results, one per
    /// provider in provider order. Called by the batch coordinator once all
    /// provider calls have joined.
    pub(crate) fn assemble(
        source: Arc<dyn ContextSource<C>>,
        files: Vec<FileId>,
        providers: Vec<Arc<dyn TransformationProvider<C>>>,
        produced: Vec<Result<ProviderOutcome, ProviderError>>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let mut session = Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Initial,
            round: 0,
            config,
            source,
            files,
            providers,
            units: Vec::new(),
            graph: DependencyGraph::new(),
            warnings: Vec::new(),
            cancel,
            created_at: Utc::now(),
        };

        for (slot, result) in produced.into_iter().enumerate() {
            session.merge_provider_output(slot, Vec::new(), Some(result));
        }

        session.state = if session.units.is_empty() {
            SessionState::Empty
        } else {
            SessionState::AwaitingSelection
        };

        tracing::info!(
            session = %session.session_id,
            providers = session.providers.len(),
            files = session.files.len(),
            units = session.units.len(),
            warnings = session.warnings.len(),
            state = %session.state,
            "selection session created"
        );
        session
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Number of recompute rounds run so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn files(&self) -> &[FileId] {
        &self.files
    }

    /// Non-fatal provider failures recorded across all rounds.
    pub fn warnings(&self) -> &[ProviderWarning] {
        &self.warnings
    }

    /// Current units in provider order, then provider-internal order.
    pub fn units(&self) -> impl Iterator<Item = &ChangeUnit> + '_ {
        self.units.iter().map(|u| &u.unit)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, id: UnitId) -> Option<&ChangeUnit> {
        self.units.iter().find(|u| u.unit.id() == id).map(|u| &u.unit)
    }

    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units.iter().map(|u| u.unit.id()).collect()
    }

    /// Units currently marked accepted (carried over from earlier rounds or
    /// set by the last selection).
    pub fn accepted_ids(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.accepted)
            .map(|u| u.unit.id())
            .collect()
    }

    /// Units accepted in an earlier round. Every later selection includes
    /// them whether or not the caller names them.
    pub fn locked_ids(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.locked)
            .map(|u| u.unit.id())
            .collect()
    }

    pub fn summaries(&self) -> Vec<UnitSummary> {
        self.units.iter().map(|u| u.unit.summary()).collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// All units that transitively depend on `id`.
    pub fn transitive_dependents(&self, id: UnitId) -> Vec<UnitId> {
        self.graph.transitive_dependents(id)
    }

    /// A selection that accepts every current unit.
    pub fn select_all(&self) -> Selection {
        Selection::new(self.unit_ids())
    }

    /// Whether any provider with units in this round recomputes after
    /// partial rejection.
    pub fn requires_recompute(&self) -> bool {
        self.units
            .iter()
            .any(|u| self.providers[u.slot].requires_recompute_after_selection())
    }

    /// Check a selection without changing the session.
    pub fn check_selection(&self, selection: &Selection) -> Result<Consistency, SessionError> {
        self.ensure_known(selection)?;
        Ok(self.graph.is_consistent(self.with_locked(selection).accepted()))
    }

    /// Units that would lose something they require if everything outside
    /// `selection` were rejected.
    pub fn rejection_impact(&self, selection: &Selection) -> Vec<UnitId> {
        let selection = self.with_locked(selection);
        let rejected: HashSet<UnitId> = self
            .units
            .iter()
            .map(|u| u.unit.id())
            .filter(|id| !selection.contains(*id))
            .collect();
        self.graph.rejection_impact(&rejected)
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            session_id: self.session_id,
            state: self.state.clone(),
            round: self.round,
            units: self.summaries(),
            accepted: self.accepted_ids(),
            warnings: self.warnings.clone(),
            created_at: self.created_at,
        }
    }

    /// Submit the reviewer's selection for the current round.
    ///
    /// Units locked by earlier rounds are accepted regardless of `selection`.
    /// Fails with `DependencyViolation` (leaving the session untouched) when
    /// the selection accepts a unit but rejects something that depends on it,
    /// unless the selection carries an explicit override. Otherwise the
    /// session moves to `Ready`, or runs one recompute round for providers
    /// that need it and returns to `AwaitingSelection`.
    pub fn submit_selection(
        &mut self,
        selection: Selection,
    ) -> Result<SelectionOutcome, SessionError> {
        self.expect_state(&SessionState::AwaitingSelection, "submit a selection")?;
        self.ensure_known(&selection)?;
        let selection = self.with_locked(&selection);

        if let Consistency::Inconsistent(pairs) = self.graph.is_consistent(selection.accepted()) {
            if !selection.overrides_violations() {
                tracing::debug!(
                    session = %self.session_id,
                    pairs = pairs.len(),
                    "selection rejected: dependency violation"
                );
                return Err(SessionError::DependencyViolation { pairs });
            }
            tracing::warn!(
                session = %self.session_id,
                pairs = pairs.len(),
                "dependency violations overridden by caller"
            );
        }

        for unit in &mut self.units {
            unit.accepted = selection.contains(unit.unit.id());
        }

        let recompute_slots = self.slots_needing_recompute();
        if recompute_slots.is_empty() {
            let accepted = self.units.iter().filter(|u| u.accepted).count();
            if accepted == 0 {
                self.units.clear();
                self.graph = DependencyGraph::new();
                self.state = SessionState::Empty;
                tracing::info!(session = %self.session_id, "every unit rejected, nothing to apply");
                return Ok(SelectionOutcome::NothingToApply);
            }
            self.state = SessionState::Ready;
            tracing::info!(session = %self.session_id, accepted, "selection final, ready to apply");
            return Ok(SelectionOutcome::Ready { accepted });
        }

        if self.round >= self.config.max_rounds {
            let max_rounds = self.config.max_rounds;
            tracing::warn!(
                session = %self.session_id,
                max_rounds,
                "recompute cap reached, failing session"
            );
            self.units.clear();
            self.graph = DependencyGraph::new();
            self.state = SessionState::Failed {
                reason: format!("recompute did not settle within {} round(s)", max_rounds),
            };
            return Err(SessionError::RecomputeLoopExceeded { max_rounds });
        }

        self.recompute(&recompute_slots);

        if self.units.is_empty() {
            self.state = SessionState::Empty;
            tracing::info!(
                session = %self.session_id,
                round = self.round,
                "recompute left nothing to apply"
            );
            return Ok(SelectionOutcome::NothingToApply);
        }

        self.state = SessionState::AwaitingSelection;
        Ok(SelectionOutcome::Recomputed {
            round: self.round,
            units: self.units.len(),
        })
    }

    /// Merge all accepted edits into one change and apply it once.
    ///
    /// The session is finalized whether or not the apply succeeds; it can
    /// never apply anything again.
    pub fn apply(&mut self) -> Result<FinalizedChange, SessionError> {
        self.expect_state(&SessionState::Ready, "apply")?;

        let units = std::mem::take(&mut self.units);
        self.graph = DependencyGraph::new();
        self.state = SessionState::Finalized;

        let mut change = CompositeChange::new(format!("session {}", self.session_id));
        let mut merged = Vec::new();
        for held in units.into_iter().filter(|u| u.accepted) {
            merged.push(held.unit.summary());
            change.push(held.unit.into_edit());
        }

        tracing::info!(
            session = %self.session_id,
            units = merged.len(),
            rounds = self.round,
            "applying merged change"
        );

        if let Err(source) = change.apply() {
            tracing::error!(session = %self.session_id, error = %source, "apply failed");
            return Err(SessionError::ApplyFailure {
                session_id: self.session_id,
                source,
            });
        }

        Ok(FinalizedChange {
            session_id: self.session_id,
            change,
            units: merged,
            rounds: self.round,
        })
    }

    /// Drop the session without applying anything.
    pub fn abandon(self) {
        tracing::info!(
            session = %self.session_id,
            state = %self.state,
            round = self.round,
            "selection session abandoned"
        );
    }

    fn expect_state(
        &self,
        expected: &SessionState,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if &self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    fn ensure_known(&self, selection: &Selection) -> Result<(), SessionError> {
        match selection
            .accepted()
            .iter()
            .find(|id| !self.graph.contains(**id))
        {
            Some(id) => Err(SessionError::UnknownUnit(*id)),
            None => Ok(()),
        }
    }

    /// `selection` plus every locked unit.
    fn with_locked(&self, selection: &Selection) -> Selection {
        let mut merged = selection.clone();
        merged
            .accepted
            .extend(self.units.iter().filter(|u| u.locked).map(|u| u.unit.id()));
        merged
    }

    /// Provider slots that recompute and had at least one unit rejected.
    fn slots_needing_recompute(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = Vec::new();
        for held in self.units.iter().filter(|u| !u.accepted) {
            if !slots.contains(&held.slot)
                && self.providers[held.slot].requires_recompute_after_selection()
            {
                slots.push(held.slot);
            }
        }
        slots.sort_unstable();
        slots
    }

    /// Run one recompute round for `slots`.
    ///
    /// Every rejected unit is discarded. Accepted units are kept for all
    /// providers; recomputing providers get their new units appended after
    /// their kept ones. The graph is rebuilt in provider order.
    fn recompute(&mut self, slots: &[usize]) {
        self.round += 1;
        self.state = SessionState::Recomputing;
        tracing::info!(
            session = %self.session_id,
            round = self.round,
            providers = slots.len(),
            "recompute round started"
        );

        let outcomes: Vec<(usize, Result<ProviderOutcome, ProviderError>)> = {
            let accepted: Vec<&ChangeUnit> = self
                .units
                .iter()
                .filter(|u| u.accepted)
                .map(|u| &u.unit)
                .collect();
            let providers = &self.providers;
            let cancel = &self.cancel;

            match refresh_all(self.source.as_ref(), &self.files, &accepted) {
                Ok(fresh) => fan_out(slots, self.config.parallel_providers, |&slot| {
                    let provider = &providers[slot];
                    let result = cancel
                        .check()
                        .and_then(|()| provider.recompute(&fresh, &accepted, cancel));
                    tracing::debug!(
                        provider = provider.name(),
                        ok = result.is_ok(),
                        "provider recompute finished"
                    );
                    (slot, result)
                }),
                Err(error) => slots
                    .iter()
                    .map(|&slot| (slot, Err(ProviderError::Context(error.clone()))))
                    .collect(),
            }
        };

        let previous = std::mem::take(&mut self.units);
        let dropped: HashSet<UnitId> = previous
            .iter()
            .filter(|u| !u.accepted)
            .map(|u| u.unit.id())
            .collect();

        let mut kept: Vec<Vec<ChangeUnit>> = self.providers.iter().map(|_| Vec::new()).collect();
        for held in previous.into_iter().filter(|u| u.accepted) {
            let mut unit = held.unit;
            // Overridden selections can keep a unit whose dependent was rejected.
            for id in &dropped {
                unit.remove_dependent(*id);
            }
            kept[held.slot].push(unit);
        }

        let mut results: Vec<Option<Result<ProviderOutcome, ProviderError>>> =
            self.providers.iter().map(|_| None).collect();
        for (slot, result) in outcomes {
            results[slot] = Some(result);
        }

        self.graph = DependencyGraph::new();
        for (slot, (kept_units, result)) in kept.into_iter().zip(results).enumerate() {
            self.merge_provider_output(slot, kept_units, result);
        }

        tracing::info!(
            session = %self.session_id,
            round = self.round,
            units = self.units.len(),
            "recompute round finished"
        );
    }

    /// Add a provider's units for this round: `kept` (already accepted)
    /// followed by whatever `result` produced. A failing result or units
    /// that do not fit the graph drop only the new units, with a warning.
    fn merge_provider_output(
        &mut self,
        slot: usize,
        kept: Vec<ChangeUnit>,
        result: Option<Result<ProviderOutcome, ProviderError>>,
    ) {
        let name = self.providers[slot].name().to_string();

        let produced = result.map(|r| r.and_then(|o| Ok(o.into_units()?)));
        let fresh = match produced {
            None => Vec::new(),
            Some(Ok(units)) => units,
            Some(Err(error)) => {
                self.record_failure(&name, error);
                Vec::new()
            }
        };

        let (kept, fresh) = match self.graph.insert(kept.iter().chain(fresh.iter())) {
            Ok(()) => (kept, fresh),
            Err(error) => {
                self.record_failure(&name, ProviderError::InvalidOutput(error));
                match self.graph.insert(kept.iter()) {
                    Ok(()) => (kept, Vec::new()),
                    Err(error) => {
                        self.record_failure(&name, ProviderError::InvalidOutput(error));
                        (Vec::new(), Vec::new())
                    }
                }
            }
        };

        tracing::debug!(
            provider = %name,
            kept = kept.len(),
            new = fresh.len(),
            "provider units merged"
        );

        self.units.extend(kept.into_iter().map(|unit| SessionUnit {
            unit,
            slot,
            accepted: true,
            locked: true,
        }));
        self.units.extend(fresh.into_iter().map(|unit| SessionUnit {
            unit,
            slot,
            accepted: false,
            locked: false,
        }));
    }

    fn record_failure(&mut self, provider: &str, error: ProviderError) {
        tracing::warn!(
            session = %self.session_id,
            provider,
            round = self.round,
            error = %error,
            "provider contribution dropped"
        );
        self.warnings
            .push(ProviderWarning::new(provider, self.round, &error));
    }
}
