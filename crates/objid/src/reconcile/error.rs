use core::time::Duration;

use crate::{AppId, ErrorKind, RangeError, ReconcileState, StorageError};

/// Why a reconciliation run did not complete.
///
/// Token conflicts never appear here unless retries ran out; they are
/// resolved inside the run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// The canonical record's stored ranges are invalid. Nothing was written.
    #[error("stored ranges of application {app_id} are invalid: {source}")]
    InvalidRanges {
        app_id: AppId,
        #[source]
        source: RangeError,
    },

    /// Every attempt lost the race to a concurrent writer.
    #[error("gave up reconciling application {app_id} after {attempts} conflicting attempts")]
    AttemptsExhausted { app_id: AppId, attempts: u32 },

    /// The run's deadline passed.
    #[error("reconciling application {app_id} exceeded its {deadline:?} deadline while {state}")]
    DeadlineExceeded {
        app_id: AppId,
        deadline: Duration,
        state: ReconcileState,
    },

    /// The store failed in a way that is not retried.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReconcileError {
    /// Classifies this error for the caller-facing layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRanges { .. } => ErrorKind::Invalid,
            Self::AttemptsExhausted { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Retryable,
            Self::Storage(err) if err.is_contention() => ErrorKind::Retryable,
            Self::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// Returns `true` if re-invoking the run later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}
