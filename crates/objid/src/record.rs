use crate::{AppId, ConsumptionSet, PoolId, Range, RangeError, RangeSet};

/// The canonical, externally persisted state of one application.
///
/// Ranges are kept exactly as stored so that a record whose ranges became
/// invalid can be detected and reported instead of silently repaired. An empty
/// list means the application has not declared ranges yet.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ApplicationRecord {
    pub app_id: AppId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ranges: Vec<Range>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub consumption: ConsumptionSet,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub pool_id: Option<PoolId>,
}

impl ApplicationRecord {
    /// An empty baseline: no ranges, nothing consumed, no pool.
    pub fn new(app_id: impl Into<AppId>) -> Self {
        Self {
            app_id: app_id.into(),
            ranges: Vec::new(),
            consumption: ConsumptionSet::new(),
            pool_id: None,
        }
    }

    #[must_use]
    pub fn with_ranges(mut self, ranges: &RangeSet) -> Self {
        self.ranges = ranges.to_vec();
        self
    }

    #[must_use]
    pub fn with_consumption(mut self, consumption: ConsumptionSet) -> Self {
        self.consumption = consumption;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool_id: impl Into<PoolId>) -> Self {
        self.pool_id = Some(pool_id.into());
        self
    }

    /// Revalidates the stored ranges.
    ///
    /// Returns `Ok(None)` when no ranges are declared.
    ///
    /// # Errors
    ///
    /// Returns the [`RangeError`] for stored ranges that are no longer valid.
    pub fn range_set(&self) -> Result<Option<RangeSet>, RangeError> {
        if self.ranges.is_empty() {
            return Ok(None);
        }
        RangeSet::new(self.ranges.clone()).map(Some)
    }
}
