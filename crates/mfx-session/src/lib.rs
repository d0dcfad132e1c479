//! # mfx-session
//!
//! Orchestration for multi-file transformation batches.
//!
//! A [`BatchCoordinator`] fans a batch of files out to a list of
//! [`TransformationProvider`]s, isolates provider failures from each other,
//! and hands back a [`SelectionSession`]. The session owns the proposed
//! [`ChangeUnit`](mfx_changeset::ChangeUnit)s and their dependency graph,
//! accepts reviewer selections, drives recompute rounds for providers that
//! need them, and finally applies every accepted edit as one change.
//!
//! Library code here is synchronous. Provider calls for distinct providers
//! may run on the `rayon` pool; merging their results is always serialized.

pub mod cancel;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod provider;
pub mod report;
pub mod session;

pub use cancel::{CancellationExt, CancellationToken};
pub use config::SessionConfig;
pub use context::ContextSource;
pub use coordinator::BatchCoordinator;
pub use error::{ConfigError, ContextError, ProviderError, SessionError};
pub use provider::{ProviderOutcome, TransformationProvider};
pub use report::{ProviderWarning, SessionReport, WarningKind};
pub use session::{FinalizedChange, Selection, SelectionOutcome, SelectionSession, SessionState};
