// coordinator.rs — BatchCoordinator: fan a file batch out to providers.
//
// Contexts are analyzed once and shared by every provider that does not ask
// for private ones. Provider calls may run concurrently on the rayon pool;
// results are joined and merged in provider order by the session, so unit
// order is always provider order, then provider-internal order.
//
// A provider that fails (error, cancellation, invalid units) is recorded as
// a warning on the session and skipped; the batch continues.

use std::collections::HashSet;
use std::sync::Arc;

use mfx_changeset::FileId;
use rayon::prelude::*;

use crate::cancel::{CancellationExt, CancellationToken};
use crate::config::SessionConfig;
use crate::context::{analyze_all, ContextSource};
use crate::error::{ContextError, ProviderError, SessionError};
use crate::provider::{ProviderOutcome, TransformationProvider};
use crate::session::SelectionSession;

/// Map `f` over `items`, on the rayon pool when `parallel` is set.
/// Output order always matches input order.
pub(crate) fn fan_out<T, R, F>(items: &[T], parallel: bool, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if parallel && items.len() > 1 {
        items.par_iter().map(f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

/// Top-level entry point for a multi-file transformation batch.
pub struct BatchCoordinator<C> {
    source: Arc<dyn ContextSource<C>>,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl<C: Send + Sync + 'static> BatchCoordinator<C> {
    pub fn new(source: Arc<dyn ContextSource<C>>) -> Self {
        Self {
            source,
            config: SessionConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned cancellation token for all provider calls.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run every provider over `files` and collect their proposals into a
    /// new selection session.
    ///
    /// Fails only when the batch itself is unusable (no files, duplicate
    /// files, shared contexts cannot be built). Provider failures become
    /// session warnings, and so does cancellation of the shared analysis.
    pub fn run(
        &self,
        providers: Vec<Arc<dyn TransformationProvider<C>>>,
        files: &[FileId],
    ) -> Result<SelectionSession<C>, SessionError> {
        if files.is_empty() {
            return Err(SessionError::NoFiles);
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = files.iter().find(|f| !seen.insert(*f)) {
            return Err(SessionError::DuplicateFile(duplicate.clone()));
        }

        tracing::info!(
            providers = providers.len(),
            files = files.len(),
            parallel = self.config.parallel_providers,
            "batch run started"
        );

        let shared = if providers.iter().any(|p| !p.requires_private_contexts()) {
            match analyze_all(self.source.as_ref(), files) {
                Ok(contexts) => Ok(contexts),
                Err(ContextError::Cancelled) => {
                    tracing::info!("shared analysis cancelled");
                    Err(ContextError::Cancelled)
                }
                Err(error) => return Err(error.into()),
            }
        } else {
            Ok(Vec::new())
        };

        let produced = fan_out(&providers, self.config.parallel_providers, |provider| {
            self.produce_one(provider.as_ref(), files, &shared)
        });

        Ok(SelectionSession::assemble(
            Arc::clone(&self.source),
            files.to_vec(),
            providers,
            produced,
            self.config.clone(),
            self.cancel.clone(),
        ))
    }

    fn produce_one(
        &self,
        provider: &dyn TransformationProvider<C>,
        files: &[FileId],
        shared: &Result<Vec<Arc<C>>, ContextError>,
    ) -> Result<ProviderOutcome, ProviderError> {
        self.cancel.check()?;
        let outcome = if provider.requires_private_contexts() {
            let private = analyze_all(self.source.as_ref(), files)?;
            provider.produce(&private, &self.cancel)
        } else {
            let shared = shared.as_ref().map_err(|e| ProviderError::Context(e.clone()))?;
            provider.produce(shared, &self.cancel)
        };
        tracing::debug!(
            provider = provider.name(),
            ok = outcome.is_ok(),
            "provider produce finished"
        );
        outcome
    }
}
