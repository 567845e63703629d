#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{FreeIds, ObjectId, Range, RangeSet};

/// The outcome of an allocation scan.
///
/// `success` is `false` when fewer IDs than requested were free; `ids` then
/// holds whatever was found, possibly nothing. Running short is a normal,
/// reportable outcome rather than an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Allocation {
    pub ids: Vec<ObjectId>,
    pub success: bool,
}

/// The outcome of allocating within one declared range.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeAllocation {
    pub range: Range,
    pub ids: Vec<ObjectId>,
    pub success: bool,
}

/// Returns the lowest free ID, or `None` when every range is fully consumed.
///
/// # Example
/// ```
/// use objid::{first_available, Range, RangeSet};
///
/// let ranges = RangeSet::new(vec![Range::new(1, 5), Range::new(10, 15)]).unwrap();
/// assert_eq!(first_available(&ranges, &[1, 2, 3, 4, 5]), Some(10));
/// ```
pub fn first_available(ranges: &RangeSet, consumed: &[ObjectId]) -> Option<ObjectId> {
    if consumed.is_empty() {
        return Some(ranges.first().from);
    }
    FreeIds::new(ranges, consumed).next()
}

/// Finds the next `count` free IDs across the whole range set, in one
/// continuous ascending scan.
///
/// `consumed` must be sorted ascending. Asking for zero IDs trivially
/// succeeds.
///
/// # Example
/// ```
/// use objid::{next_available, Range, RangeSet};
///
/// let ranges = RangeSet::new(vec![Range::new(50000, 50099)]).unwrap();
///
/// let allocation = next_available(&ranges, &[], 1);
/// assert_eq!(allocation.ids, vec![50000]);
/// assert!(allocation.success);
///
/// let full: Vec<u32> = (50000..=50099).collect();
/// let allocation = next_available(&ranges, &full, 1);
/// assert!(allocation.ids.is_empty());
/// assert!(!allocation.success);
/// ```
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(ranges, consumed), fields(consumed = consumed.len()))
)]
pub fn next_available(ranges: &RangeSet, consumed: &[ObjectId], count: usize) -> Allocation {
    if count == 1 {
        let ids: Vec<_> = first_available(ranges, consumed).into_iter().collect();
        let success = !ids.is_empty();
        return Allocation { ids, success };
    }
    collect(FreeIds::new(ranges, consumed), count)
}

/// Finds up to `count` free IDs inside each declared range independently.
///
/// Use this when the caller needs an ID guaranteed to fall within every range
/// rather than anywhere in the combined pool. One [`RangeAllocation`] is
/// returned per range, in ascending range order.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(ranges, consumed), fields(consumed = consumed.len()))
)]
pub fn next_available_per_range(
    ranges: &RangeSet,
    consumed: &[ObjectId],
    count: usize,
) -> Vec<RangeAllocation> {
    ranges
        .iter()
        .map(|range| {
            let Allocation { ids, success } = collect(FreeIds::within(range, consumed), count);
            RangeAllocation {
                range: *range,
                ids,
                success,
            }
        })
        .collect()
}

fn collect(free: FreeIds<'_>, count: usize) -> Allocation {
    let ids: Vec<_> = free.take(count).collect();
    let success = ids.len() == count;
    Allocation { ids, success }
}
