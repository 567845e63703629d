use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{AppId, ApplicationRecord, PoolError, PoolId, RangeSet};

/// A pool: several applications drawing IDs from one owner's ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Pool {
    pub pool_id: PoolId,
    /// The owner's record. Its ranges are authoritative for every member.
    pub owner: ApplicationRecord,
    /// Whether members record consumption under the owner instead of under
    /// their own application.
    #[cfg_attr(feature = "serde", serde(default))]
    pub shared_consumption: bool,
}

/// Looks up pools by ID.
///
/// Implementations answer from a snapshot that already encodes pool linkage;
/// resolution never persists membership.
pub trait PoolRegistry {
    fn pool(&self, pool_id: &PoolId) -> Option<&Pool>;
}

/// An in-memory [`PoolRegistry`] built from explicit owner designations.
#[derive(Clone, Debug, Default)]
pub struct PoolDirectory {
    pools: HashMap<PoolId, Pool>,
}

impl PoolDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Designates the owner of a pool, returning the previous designation.
    pub fn designate(&mut self, pool: Pool) -> Option<Pool> {
        self.pools.insert(pool.pool_id.clone(), pool)
    }

    /// Dissolves a pool. Members still referencing it will fail to resolve.
    pub fn dissolve(&mut self, pool_id: &PoolId) -> Option<Pool> {
        self.pools.remove(pool_id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl PoolRegistry for PoolDirectory {
    fn pool(&self, pool_id: &PoolId) -> Option<&Pool> {
        self.pools.get(pool_id)
    }
}

impl FromIterator<Pool> for PoolDirectory {
    fn from_iter<I: IntoIterator<Item = Pool>>(iter: I) -> Self {
        let mut directory = Self::new();
        for pool in iter {
            directory.designate(pool);
        }
        directory
    }
}

/// Where an application's allocations actually come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectiveSource {
    /// The authoritative ranges.
    pub ranges: RangeSet,
    /// The application whose consumption record must be consulted.
    pub consumption_owner: AppId,
    /// The pool the ranges came from, if any.
    pub pool_id: Option<PoolId>,
}

/// Resolves the effective ranges and consumption owner of `record`.
///
/// - Without a pool the record is its own source.
/// - With a pool the owner's ranges apply; the member's own ranges, if any,
///   are ignored for allocation. Consumption belongs to the owner when the
///   pool shares it, otherwise to the member.
///
/// # Errors
///
/// - [`PoolError::PoolOwnerNotFound`] if the pool cannot be resolved
/// - [`PoolError::NoRanges`] if the authoritative record declares no ranges
/// - [`PoolError::InvalidRanges`] if its stored ranges fail validation
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(app_id = %record.app_id), err)
)]
pub fn resolve_effective_source<R>(
    record: &ApplicationRecord,
    registry: &R,
) -> Result<EffectiveSource, PoolError>
where
    R: PoolRegistry + ?Sized,
{
    let Some(pool_id) = &record.pool_id else {
        return Ok(EffectiveSource {
            ranges: authoritative_ranges(record)?,
            consumption_owner: record.app_id.clone(),
            pool_id: None,
        });
    };

    let pool = registry
        .pool(pool_id)
        .ok_or_else(|| PoolError::PoolOwnerNotFound {
            app_id: record.app_id.clone(),
            pool_id: pool_id.clone(),
        })?;

    let consumption_owner = if pool.shared_consumption {
        pool.owner.app_id.clone()
    } else {
        record.app_id.clone()
    };

    Ok(EffectiveSource {
        ranges: authoritative_ranges(&pool.owner)?,
        consumption_owner,
        pool_id: Some(pool_id.clone()),
    })
}

fn authoritative_ranges(record: &ApplicationRecord) -> Result<RangeSet, PoolError> {
    record
        .range_set()
        .map_err(|source| PoolError::InvalidRanges {
            app_id: record.app_id.clone(),
            source,
        })?
        .ok_or_else(|| PoolError::NoRanges {
            app_id: record.app_id.clone(),
        })
}
