#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AppId, ConsumptionSet, ObjectId, ObjectType, Range, RangeError, RangeSet, next_available,
    next_available_per_range,
};

/// Asks for IDs of several object types for one application.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct AllocationRequest {
    pub app_id: AppId,
    /// The ranges declared by the requesting application, unvalidated.
    pub ranges: Vec<Range>,
    pub per_type: Vec<TypeRequest>,
}

/// How many IDs of one object type to look for, and in which mode.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct TypeRequest {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub object_type: ObjectType,
    #[cfg_attr(feature = "serde", serde(default = "default_count"))]
    pub count: usize,
    /// Allocate within every declared range separately instead of across the
    /// combined pool.
    #[cfg_attr(feature = "serde", serde(default))]
    pub per_range: bool,
}

#[cfg(feature = "serde")]
const fn default_count() -> usize {
    1
}

impl TypeRequest {
    pub fn new(object_type: impl Into<ObjectType>, count: usize) -> Self {
        Self {
            object_type: object_type.into(),
            count,
            per_range: false,
        }
    }

    #[must_use]
    pub fn per_range(mut self) -> Self {
        self.per_range = true;
        self
    }
}

/// The answer to an [`AllocationRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct AllocationResponse {
    pub app_id: AppId,
    pub results: Vec<TypeAllocation>,
}

/// One result line: IDs found for a type, either across the whole pool
/// (`range` is `None`) or within one declared range.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct TypeAllocation {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub object_type: ObjectType,
    pub range: Option<Range>,
    pub ids: Vec<ObjectId>,
    pub success: bool,
}

impl AllocationRequest {
    /// Validates the declared ranges.
    ///
    /// # Errors
    ///
    /// Returns the [`RangeError`] describing the first problem found.
    pub fn validate(&self) -> Result<RangeSet, RangeError> {
        RangeSet::new(self.ranges.clone())
    }

    /// Validates the request and allocates against its own ranges.
    ///
    /// Callers resolving a pool should call [`allocate`] with the effective
    /// ranges instead.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if the declared ranges are invalid. Nothing is
    /// allocated in that case.
    pub fn execute(&self, consumption: &ConsumptionSet) -> Result<AllocationResponse, RangeError> {
        let ranges = self.validate()?;
        Ok(AllocationResponse {
            app_id: self.app_id.clone(),
            results: allocate(&ranges, &self.per_type, consumption),
        })
    }
}

/// Answers every [`TypeRequest`] against `ranges` and `consumption`.
///
/// Each line is computed independently against the same read-only
/// consumption; the allocator never records what it hands out.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(types = per_type.len())))]
pub fn allocate(
    ranges: &RangeSet,
    per_type: &[TypeRequest],
    consumption: &ConsumptionSet,
) -> Vec<TypeAllocation> {
    let mut results = Vec::with_capacity(per_type.len());
    for request in per_type {
        let consumed = consumption.ids(request.object_type.as_str());
        if request.per_range {
            results.extend(
                next_available_per_range(ranges, consumed, request.count)
                    .into_iter()
                    .map(|found| TypeAllocation {
                        object_type: request.object_type.clone(),
                        range: Some(found.range),
                        ids: found.ids,
                        success: found.success,
                    }),
            );
        } else {
            let found = next_available(ranges, consumed, request.count);
            #[cfg(feature = "tracing")]
            if !found.success {
                tracing::debug!(
                    object_type = %request.object_type,
                    requested = request.count,
                    found = found.ids.len(),
                    "ranges exhausted"
                );
            }
            results.push(TypeAllocation {
                object_type: request.object_type.clone(),
                range: None,
                ids: found.ids,
                success: found.success,
            });
        }
    }
    results
}
