//! # mfx-changeset
//!
//! The data model for multi-file transformation proposals.
//!
//! A [`ChangeUnit`] is one independently selectable proposed edit. Units
//! declare which other units depend on them; a [`DependencyGraph`] built from
//! those declarations answers reachability and consistency questions so a
//! reviewer can accept or reject units individually without producing an
//! inconsistent result.
//!
//! The actual file modification behind a unit is opaque to this crate: it is
//! any type implementing [`Change`]. Accepted edits are merged into a single
//! [`CompositeChange`] that is applied as one unit.

pub mod change;
pub mod error;
pub mod graph;
pub mod unit;

pub use change::{ApplyError, Change, CompositeChange, FileId};
pub use error::ChangeSetError;
pub use graph::{Consistency, DependencyGraph, DependencyPair};
pub use unit::{ChangeUnit, UnitId, UnitSummary};
