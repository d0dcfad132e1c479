// cancel.rs — Cooperative cancellation for provider calls.
//
// Provider calls are synchronous, so providers poll the token between files
// rather than awaiting it.

pub use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Polling helpers for [`CancellationToken`] inside produce/recompute.
pub trait CancellationExt {
    /// `Err(ProviderError::Cancelled)` once cancellation was requested.
    fn check(&self) -> Result<(), ProviderError>;
}

impl CancellationExt for CancellationToken {
    fn check(&self) -> Result<(), ProviderError> {
        if self.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());

        token.cancel();

        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(ProviderError::Cancelled)));
    }

    #[test]
    fn child_token_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(parent.check().is_ok());

        let other = parent.child_token();
        parent.cancel();
        assert!(matches!(other.check(), Err(ProviderError::Cancelled)));
    }
}
