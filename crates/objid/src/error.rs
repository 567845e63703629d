use crate::{ConsumptionError, PoolError, RangeError, ReconcileError, StorageError};

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `objid` can produce.
///
/// Running out of free IDs is not an error: an allocation that finds fewer IDs
/// than requested reports it through
/// [`Allocation::success`](crate::Allocation::success).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A range specification was rejected.
    #[error(transparent)]
    Range(#[from] RangeError),

    /// A consumption specification was rejected.
    #[error(transparent)]
    Consumption(#[from] ConsumptionError),

    /// Pool resolution failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Reconciliation against canonical storage failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// How a caller-facing layer should react to an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is invalid and must be fixed before retrying.
    Invalid,
    /// The system could not complete the request right now. Re-invoking later
    /// is safe because merges are idempotent.
    Retryable,
    /// Storage or transport failed in a way the engine does not recover from.
    Fatal,
}

impl Error {
    /// Classifies this error for the caller-facing layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Range(_) | Self::Consumption(_) | Self::Pool(_) => ErrorKind::Invalid,
            Self::Reconcile(err) => err.kind(),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::Reconcile(err.into())
    }
}
