use core::{future::Future, marker::PhantomData};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AppId, ApplicationRecord, ConsumptionSet, ConsumptionStore, LeaseId, RangeSet, ReconcileConfig,
    ReconcileError, ReconcileState, SleepProvider, Snapshot, StorageError, futures::within,
};

/// What a successful reconciliation run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciled<T> {
    /// The canonical record as committed (or as found, if nothing changed).
    pub record: ApplicationRecord,
    /// The token of `record`. `None` only when nothing was ever stored and
    /// nothing needed storing.
    pub token: Option<T>,
    /// IDs that became canonical through this run.
    pub added: ConsumptionSet,
    /// Number of fetch-merge-commit attempts taken, starting at one.
    pub attempts: u32,
    /// Whether a write was issued.
    pub changed: bool,
}

/// Merges discovered consumption into the canonical record of an application,
/// serializing concurrent writers through the store's conditional write.
///
/// `P` supplies backoff and deadline timers, e.g.
/// [`TokioSleep`](crate::TokioSleep).
pub struct Reconciler<S, P> {
    store: S,
    config: ReconcileConfig,
    _sleep: PhantomData<fn() -> P>,
}

impl<S, P> Reconciler<S, P>
where
    S: ConsumptionStore + Sync,
    P: SleepProvider,
{
    pub fn new(store: S, config: ReconcileConfig) -> Self {
        Self {
            store,
            config,
            _sleep: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Merges `discovered` into the canonical record of `app_id`.
    ///
    /// Equivalent to [`Self::reconcile_with_ranges`] without replacement
    /// ranges.
    ///
    /// # Errors
    ///
    /// See [`Self::reconcile_with_ranges`].
    pub async fn reconcile(
        &self,
        app_id: &AppId,
        discovered: &ConsumptionSet,
    ) -> Result<Reconciled<S::Token>, ReconcileError> {
        self.reconcile_with_ranges(app_id, discovered, None).await
    }

    /// Merges `discovered` into the canonical record of `app_id`, optionally
    /// replacing its stored ranges with `ranges`.
    ///
    /// A missing record is created from an empty baseline. Each attempt
    /// fetches the record, merges the original `discovered` set into it and
    /// writes back conditionally on the fetched token. A conflict starts a new
    /// attempt after the configured backoff. When the merge adds nothing and
    /// the ranges are unchanged, no write is issued.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::InvalidRanges`] if the stored ranges fail
    ///   validation and no replacement was supplied. Nothing is written.
    /// - [`ReconcileError::AttemptsExhausted`] once every attempt conflicted
    /// - [`ReconcileError::DeadlineExceeded`] if the configured deadline passed
    /// - [`ReconcileError::Storage`] for store failures other than contention,
    ///   which are not retried
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, discovered, ranges),
            fields(app_id = %app_id, ids = discovered.len()),
            err
        )
    )]
    pub async fn reconcile_with_ranges(
        &self,
        app_id: &AppId,
        discovered: &ConsumptionSet,
        ranges: Option<&RangeSet>,
    ) -> Result<Reconciled<S::Token>, ReconcileError> {
        let mut run = Run {
            app_id,
            discovered,
            ranges,
            started: Instant::now(),
            state: ReconcileState::Idle,
            attempt: 0,
        };

        loop {
            run.attempt += 1;
            match self.attempt(&mut run).await {
                Ok(done) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        attempts = done.attempts,
                        changed = done.changed,
                        added = done.added.len(),
                        "reconciled"
                    );
                    run.state.advance(ReconcileState::Idle);
                    return Ok(done);
                }
                Err(ReconcileError::Storage(err)) if err.is_contention() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt = run.attempt, error = %err, "lost race to a concurrent writer");
                    if run.attempt >= self.config.max_attempts() {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(attempts = run.attempt, "giving up after repeated conflicts");
                        run.state.advance(ReconcileState::Failed);
                        return Err(ReconcileError::AttemptsExhausted {
                            app_id: app_id.clone(),
                            attempts: run.attempt,
                        });
                    }
                }
                Err(err) => {
                    run.state.advance(ReconcileState::Failed);
                    return Err(err);
                }
            }

            run.state.advance(ReconcileState::Retrying);
            let backoff = self.config.backoff();
            if !backoff.is_zero() {
                if let Err(err) = self.bounded(&run, P::sleep_for(backoff)).await {
                    run.state.advance(ReconcileState::Failed);
                    return Err(err);
                }
            }
        }
    }

    /// Reconciles several applications one after another.
    ///
    /// Each application gets its own run, retry budget and deadline; a
    /// failure for one does not stop the others.
    pub async fn reconcile_many<I>(
        &self,
        batch: I,
    ) -> Vec<(AppId, Result<Reconciled<S::Token>, ReconcileError>)>
    where
        I: IntoIterator<Item = (AppId, ConsumptionSet)>,
    {
        let mut results = Vec::new();
        for (app_id, discovered) in batch {
            let result = self.reconcile(&app_id, &discovered).await;
            results.push((app_id, result));
        }
        results
    }

    async fn attempt(&self, run: &mut Run<'_>) -> Result<Reconciled<S::Token>, ReconcileError> {
        run.state.advance(ReconcileState::Fetching);
        let (current, token) = match self.bounded(run, self.store.fetch(run.app_id)).await? {
            Ok(Snapshot { record, token }) => (record, Some(token)),
            Err(StorageError::NotFound { .. }) => (ApplicationRecord::new(run.app_id.clone()), None),
            Err(err) => return Err(err.into()),
        };

        let lease = if self.config.use_lease() {
            self.bounded(run, self.store.acquire_lease(run.app_id))
                .await??
        } else {
            None
        };

        let result = self.merge_and_commit(run, current, token, lease.as_ref()).await;

        if let Some(lease) = lease {
            let released = self.store.release_lease(run.app_id, lease).await;
            // The write outcome stands either way.
            #[cfg(feature = "tracing")]
            if let Err(err) = &released {
                tracing::warn!(error = %err, "failed to release update lease");
            }
            #[cfg(not(feature = "tracing"))]
            let _ = released;
        }
        result
    }

    async fn merge_and_commit(
        &self,
        run: &mut Run<'_>,
        current: ApplicationRecord,
        token: Option<S::Token>,
        lease: Option<&LeaseId>,
    ) -> Result<Reconciled<S::Token>, ReconcileError> {
        run.state.advance(ReconcileState::Merging);
        let mut next = current.clone();
        match run.ranges {
            Some(ranges) => next.ranges = ranges.to_vec(),
            None => {
                current
                    .range_set()
                    .map_err(|source| ReconcileError::InvalidRanges {
                        app_id: run.app_id.clone(),
                        source,
                    })?;
            }
        }
        next.consumption = current.consumption.merge(run.discovered);
        let added = next.consumption.difference(&current.consumption);

        if next == current {
            return Ok(Reconciled {
                record: next,
                token,
                added,
                attempts: run.attempt,
                changed: false,
            });
        }

        run.state.advance(ReconcileState::Committing);
        let write = self
            .store
            .conditional_write(run.app_id, &next, token.as_ref(), lease);
        let token = self.bounded(run, write).await??;

        Ok(Reconciled {
            record: next,
            token: Some(token),
            added,
            attempts: run.attempt,
            changed: true,
        })
    }

    /// Awaits `fut` within what is left of the run's deadline.
    async fn bounded<F: Future>(&self, run: &Run<'_>, fut: F) -> Result<F::Output, ReconcileError> {
        let remaining = self
            .config
            .deadline()
            .map(|deadline| deadline.saturating_sub(run.started.elapsed()));
        within::<P, _>(remaining, fut)
            .await
            .map_err(|_| ReconcileError::DeadlineExceeded {
                app_id: run.app_id.clone(),
                deadline: self.config.deadline().unwrap_or_default(),
                state: run.state,
            })
    }
}

/// Per-run context threaded through the attempts of one reconciliation.
struct Run<'a> {
    app_id: &'a AppId,
    discovered: &'a ConsumptionSet,
    ranges: Option<&'a RangeSet>,
    started: Instant,
    state: ReconcileState,
    attempt: u32,
}
