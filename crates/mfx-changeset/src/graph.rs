// graph.rs — Dependency graph over change units.
//
// Edges come solely from each unit's `dependents` list: if B is listed as a
// dependent of A, then B requires A (edge A -> B). The graph is validated on
// insertion: every dependent must be a known unit, no unit may depend on
// itself, and following dependent edges must never revisit a unit.
//
// A selection is consistent when every accepted unit that others depend on
// has all of its (transitive) dependents accepted too. Inconsistent
// selections are reported as (unit, dependent) pairs for the reviewer.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::ChangeSetError;
use crate::unit::{ChangeUnit, UnitId};

/// An accepted unit paired with one of its dependents that was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyPair {
    /// The accepted unit.
    pub unit: UnitId,
    /// A unit requiring `unit` that is missing from the selection.
    pub dependent: UnitId,
}

/// Outcome of checking a proposed selection against the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "pairs", rename_all = "snake_case")]
pub enum Consistency {
    Consistent,
    Inconsistent(Vec<DependencyPair>),
}

impl Consistency {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Consistency::Consistent)
    }

    /// Offending pairs (empty when consistent).
    pub fn offending_pairs(&self) -> &[DependencyPair] {
        match self {
            Consistency::Consistent => &[],
            Consistency::Inconsistent(pairs) => pairs,
        }
    }
}

/// Acyclic "required by" graph built from change units.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Unit ids in insertion order, for deterministic traversal.
    order: Vec<UnitId>,
    /// Unit -> units that depend on it (its declared dependents).
    depended_by: HashMap<UnitId, Vec<UnitId>>,
    /// Unit -> units it depends on.
    depends_on: HashMap<UnitId, Vec<UnitId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from one batch of units.
    pub fn from_units(units: &[ChangeUnit]) -> Result<Self, ChangeSetError> {
        let mut graph = Self::new();
        graph.insert(units)?;
        Ok(graph)
    }

    /// Add units and their dependent edges.
    ///
    /// Dependents may name units already in the graph or units in `units`.
    /// On error the graph is left exactly as it was.
    pub fn insert<'a, I>(&mut self, units: I) -> Result<(), ChangeSetError>
    where
        I: IntoIterator<Item = &'a ChangeUnit>,
    {
        let units: Vec<&ChangeUnit> = units.into_iter().collect();
        let mut candidate = self.clone();

        for unit in &units {
            let id = unit.id();
            if candidate.depended_by.contains_key(&id) {
                return Err(ChangeSetError::DuplicateUnit(id));
            }
            candidate.order.push(id);
            candidate.depended_by.insert(id, Vec::new());
            candidate.depends_on.insert(id, Vec::new());
        }

        for unit in &units {
            let id = unit.id();
            for &dependent in unit.dependents() {
                if dependent == id {
                    return Err(ChangeSetError::SelfDependency { unit: id });
                }
                if !candidate.depended_by.contains_key(&dependent) {
                    return Err(ChangeSetError::UnknownDependent { unit: id, dependent });
                }
                candidate.depended_by.entry(id).or_default().push(dependent);
                candidate.depends_on.entry(dependent).or_default().push(id);
            }
        }

        if let Some(cycle) = candidate.find_cycle() {
            return Err(ChangeSetError::CyclicDependency { cycle });
        }

        *self = candidate;
        tracing::debug!(added = units.len(), total = self.len(), "dependency graph updated");
        Ok(())
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.depended_by.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All unit ids in insertion order.
    pub fn unit_ids(&self) -> &[UnitId] {
        &self.order
    }

    /// Units that directly depend on `id`.
    pub fn dependents(&self, id: UnitId) -> &[UnitId] {
        self.depended_by.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Units that `id` directly depends on.
    pub fn dependencies(&self, id: UnitId) -> &[UnitId] {
        self.depends_on.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every unit reachable by following dependent edges from `id`,
    /// in breadth-first discovery order. Does not include `id` itself.
    pub fn transitive_dependents(&self, id: UnitId) -> Vec<UnitId> {
        let mut seen: HashSet<UnitId> = HashSet::from([id]);
        let mut found = Vec::new();
        let mut queue: VecDeque<UnitId> = self.dependents(id).iter().copied().collect();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            found.push(next);
            queue.extend(self.dependents(next).iter().copied());
        }
        found
    }

    /// Check a proposed acceptance set. Never mutates the graph.
    ///
    /// Ids in `accepted` that are not in the graph are ignored.
    pub fn is_consistent(&self, accepted: &HashSet<UnitId>) -> Consistency {
        let mut pairs = Vec::new();
        for &unit in self.order.iter().filter(|id| accepted.contains(*id)) {
            for dependent in self.transitive_dependents(unit) {
                if !accepted.contains(&dependent) {
                    pairs.push(DependencyPair { unit, dependent });
                }
            }
        }

        if pairs.is_empty() {
            Consistency::Consistent
        } else {
            Consistency::Inconsistent(pairs)
        }
    }

    /// Units that would be left without something they require if
    /// `rejected` were dropped: the transitive dependents of every rejected
    /// unit, excluding the rejected units themselves, in graph order.
    pub fn rejection_impact(&self, rejected: &HashSet<UnitId>) -> Vec<UnitId> {
        let affected: HashSet<UnitId> = rejected
            .iter()
            .flat_map(|id| self.transitive_dependents(*id))
            .filter(|id| !rejected.contains(id))
            .collect();
        self.order
            .iter()
            .copied()
            .filter(|id| affected.contains(id))
            .collect()
    }

    /// Detect a cycle along dependent edges using DFS. Returns the first
    /// cycle found, as the path of units that closes on itself.
    fn find_cycle(&self) -> Option<Vec<UnitId>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for &node in &self.order {
            if !visited.contains(&node) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: UnitId,
        visited: &mut HashSet<UnitId>,
        on_stack: &mut HashSet<UnitId>,
        path: &mut Vec<UnitId>,
    ) -> Option<Vec<UnitId>> {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        for &next in self.dependents(node) {
            if on_stack.contains(&next) {
                let start = path.iter().position(|n| *n == next).unwrap_or(0);
                return Some(path[start..].to_vec());
            }
            if !visited.contains(&next) {
                if let Some(cycle) = self.dfs_cycle(next, visited, on_stack, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        on_stack.remove(&node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ApplyError, Change, FileId};

    #[derive(Debug)]
    struct Noop;

    impl Change for Noop {
        fn affected_files(&self) -> Vec<FileId> {
            Vec::new()
        }
        fn apply(&mut self) -> Result<(), ApplyError> {
            Ok(())
        }
        fn revert(&mut self) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    fn unit(id: UnitId, dependents: &[UnitId]) -> ChangeUnit {
        let mut unit = ChangeUnit::with_id(id, format!("unit {}", id), Box::new(Noop)).unwrap();
        for d in dependents {
            unit.add_dependent(*d);
        }
        unit
    }

    fn ids<const N: usize>() -> [UnitId; N] {
        std::array::from_fn(|_| UnitId::new())
    }

    #[test]
    fn no_dependents_is_always_consistent() {
        let [a, b, c] = ids();
        let graph =
            DependencyGraph::from_units(&[unit(a, &[]), unit(b, &[]), unit(c, &[])]).unwrap();

        let selections: [&[UnitId]; 4] = [&[], &[a], &[b, c], &[a, b, c]];
        for selection in selections {
            let accepted: HashSet<UnitId> = selection.iter().copied().collect();
            assert_eq!(graph.is_consistent(&accepted), Consistency::Consistent);
        }
    }

    #[test]
    fn transitive_dependents_follow_chains() {
        let [a, b, c, d] = ids();
        // b depends on a, c depends on b; d is unrelated.
        let graph = DependencyGraph::from_units(&[
            unit(a, &[b]),
            unit(b, &[c]),
            unit(c, &[]),
            unit(d, &[]),
        ])
        .unwrap();

        assert_eq!(graph.transitive_dependents(a), vec![b, c]);
        assert_eq!(graph.transitive_dependents(b), vec![c]);
        assert!(graph.transitive_dependents(d).is_empty());
        assert_eq!(graph.dependencies(c), &[b]);
    }

    #[test]
    fn diamond_reports_each_dependent_once() {
        let [a, b, c, d] = ids();
        let graph = DependencyGraph::from_units(&[
            unit(a, &[b, c]),
            unit(b, &[d]),
            unit(c, &[d]),
            unit(d, &[]),
        ])
        .unwrap();

        assert_eq!(graph.transitive_dependents(a), vec![b, c, d]);
    }

    #[test]
    fn two_unit_cycle_is_rejected() {
        let [a, b] = ids();
        let err = DependencyGraph::from_units(&[unit(a, &[b]), unit(b, &[a])]).unwrap_err();
        match err {
            ChangeSetError::CyclicDependency { cycle } => {
                assert_eq!(cycle.len(), 2);
                assert!(cycle.contains(&a) && cycle.contains(&b));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn longer_cycle_is_rejected() {
        let [a, b, c] = ids();
        let result = DependencyGraph::from_units(&[unit(a, &[b]), unit(b, &[c]), unit(c, &[a])]);
        assert!(matches!(result, Err(ChangeSetError::CyclicDependency { .. })));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let [a] = ids();
        let result = DependencyGraph::from_units(&[unit(a, &[a])]);
        assert!(matches!(result, Err(ChangeSetError::SelfDependency { unit }) if unit == a));
    }

    #[test]
    fn unknown_dependent_is_rejected() {
        let [a, stranger] = ids();
        let result = DependencyGraph::from_units(&[unit(a, &[stranger])]);
        assert!(matches!(
            result,
            Err(ChangeSetError::UnknownDependent { dependent, .. }) if dependent == stranger
        ));
    }

    #[test]
    fn duplicate_unit_is_rejected() {
        let [a] = ids();
        let result = DependencyGraph::from_units(&[unit(a, &[]), unit(a, &[])]);
        assert!(matches!(result, Err(ChangeSetError::DuplicateUnit(id)) if id == a));
    }

    #[test]
    fn failed_insert_leaves_graph_untouched() {
        let [a, b, c] = ids();
        let mut graph = DependencyGraph::from_units(&[unit(a, &[])]).unwrap();

        let result = graph.insert(&[unit(b, &[c]), unit(c, &[b])]);

        assert!(result.is_err());
        assert_eq!(graph.unit_ids(), &[a]);
        assert!(!graph.contains(b));
    }

    #[test]
    fn insert_can_reference_existing_units() {
        let [a, b] = ids();
        let mut graph = DependencyGraph::from_units(&[unit(a, &[])]).unwrap();
        graph.insert(&[unit(b, &[a])]).unwrap();
        assert_eq!(graph.dependents(b), &[a]);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn accepting_required_unit_without_dependent_is_inconsistent() {
        let [a, b] = ids();
        let graph = DependencyGraph::from_units(&[unit(a, &[b]), unit(b, &[])]).unwrap();

        let only_a = HashSet::from([a]);
        let result = graph.is_consistent(&only_a);
        assert_eq!(
            result.offending_pairs(),
            &[DependencyPair { unit: a, dependent: b }]
        );

        let both = HashSet::from([a, b]);
        assert!(graph.is_consistent(&both).is_consistent());

        let only_b = HashSet::from([b]);
        assert!(graph.is_consistent(&only_b).is_consistent());
    }

    #[test]
    fn inconsistency_includes_transitive_dependents() {
        let [a, b, c] = ids();
        let graph =
            DependencyGraph::from_units(&[unit(a, &[b]), unit(b, &[c]), unit(c, &[])]).unwrap();

        let accepted = HashSet::from([a, b]);
        let result = graph.is_consistent(&accepted);
        assert_eq!(
            result.offending_pairs(),
            &[
                DependencyPair { unit: a, dependent: c },
                DependencyPair { unit: b, dependent: c },
            ]
        );
    }

    #[test]
    fn rejection_impact_cascades() {
        let [a, b, c, d] = ids();
        let graph = DependencyGraph::from_units(&[
            unit(a, &[b]),
            unit(b, &[c]),
            unit(c, &[]),
            unit(d, &[]),
        ])
        .unwrap();

        assert_eq!(graph.rejection_impact(&HashSet::from([a])), vec![b, c]);
        assert_eq!(graph.rejection_impact(&HashSet::from([a, b])), vec![c]);
        assert!(graph.rejection_impact(&HashSet::from([d])).is_empty());
    }

    #[test]
    fn consistency_serializes_with_status_tag() {
        let json = serde_json::to_string(&Consistency::Consistent).unwrap();
        assert_eq!(json, r#"{"status":"consistent"}"#);
    }
}
