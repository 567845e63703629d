use crate::{AppId, PoolId, RangeError};

/// Errors raised while resolving which ranges and consumption apply to an
/// application.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The record references a pool whose owner cannot be resolved.
    #[error("application {app_id} references pool {pool_id}, whose owner cannot be found")]
    PoolOwnerNotFound { app_id: AppId, pool_id: PoolId },

    /// The authoritative record has not declared any ranges.
    #[error("application {app_id} has no ranges declared")]
    NoRanges { app_id: AppId },

    /// The authoritative record's stored ranges are invalid.
    #[error("ranges of application {app_id} are invalid: {source}")]
    InvalidRanges {
        app_id: AppId,
        #[source]
        source: RangeError,
    },
}
