// error.rs — Error types for the changeset subsystem.

use thiserror::Error;

use crate::unit::UnitId;

/// Errors that can occur while constructing change units or their graph.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// A unit was created without a human-readable description.
    #[error("change unit description must not be empty")]
    EmptyDescription,

    /// A unit listed itself as its own dependent.
    #[error("unit {unit} lists itself as a dependent")]
    SelfDependency { unit: UnitId },

    /// A dependent id does not match any unit in the same batch.
    #[error("unit {unit} lists unknown dependent {dependent}")]
    UnknownDependent { unit: UnitId, dependent: UnitId },

    /// The same unit id appears twice in one batch.
    #[error("duplicate unit id {0}")]
    DuplicateUnit(UnitId),

    /// Following dependent edges revisits a unit.
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<UnitId> },
}

fn format_cycle(cycle: &[UnitId]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let a = UnitId::new();
        let b = UnitId::new();
        let err = ChangeSetError::CyclicDependency { cycle: vec![a, b] };
        assert_eq!(
            err.to_string(),
            format!("cyclic dependency: {} -> {} -> {}", a, b, a)
        );
    }
}
