// report.rs — Warnings and serializable session snapshots.
//
// Provider failures never abort a batch; each one becomes a ProviderWarning
// attached to the session. SessionReport is the read-only view handed to
// review surfaces (tree renderers, JSON consumers).

use chrono::{DateTime, Utc};
use mfx_changeset::{UnitId, UnitSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContextError, ProviderError};
use crate::session::SessionState;

/// Why a provider's contribution was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The provider reported an error or its contexts could not be built.
    Failed,
    /// The provider observed cancellation.
    Cancelled,
    /// The provider returned units that do not form a valid batch.
    InvalidOutput,
}

/// A non-fatal provider failure recorded on a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderWarning {
    pub provider: String,
    /// Recompute round in which the failure happened (0 = initial produce).
    pub round: u32,
    pub kind: WarningKind,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl ProviderWarning {
    pub fn new(provider: impl Into<String>, round: u32, error: &ProviderError) -> Self {
        let kind = match error {
            ProviderError::Cancelled | ProviderError::Context(ContextError::Cancelled) => {
                WarningKind::Cancelled
            }
            ProviderError::InvalidOutput(_) => WarningKind::InvalidOutput,
            ProviderError::Context(_) | ProviderError::Other(_) => WarningKind::Failed,
        };
        Self {
            provider: provider.into(),
            round,
            kind,
            message: error.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Serializable snapshot of a selection session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub round: u32,
    pub units: Vec<UnitSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted: Vec<UnitId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ProviderWarning>,
    pub created_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
