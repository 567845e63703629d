use core::fmt;

/// Where a reconciliation run currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileState {
    Idle,
    /// Waiting on the canonical snapshot and its token.
    Fetching,
    /// Merging the discovered delta and revalidating ranges.
    Merging,
    /// Waiting on the conditional write.
    Committing,
    /// A concurrent writer won; about to fetch again.
    Retrying,
    Failed,
}

impl ReconcileState {
    pub(crate) fn advance(&mut self, next: Self) {
        #[cfg(feature = "tracing")]
        tracing::trace!(from = %self, to = %next, "reconcile state");
        *self = next;
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Merging => "merging",
            Self::Committing => "committing",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        })
    }
}
