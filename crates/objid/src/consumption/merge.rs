use core::cmp::Ordering;

use crate::{ConsumptionSet, ObjectId};

/// Merges locally discovered consumption into the canonical record.
///
/// Per object type the result is the sorted, deduplicated union of both sides.
/// Discovered IDs are evidence that an ID is used, never that one is free, so
/// a merge can only ever add IDs. The operation is commutative, associative
/// and idempotent, which is what lets concurrent writers re-derive a merge
/// against fresher canonical state without losing anything.
///
/// # Example
/// ```
/// use objid::{merge, ConsumptionSet};
///
/// let canonical = ConsumptionSet::from_unsorted([("table", vec![50001, 50000])]);
/// let discovered = ConsumptionSet::from_unsorted([("table", vec![50002, 50000])]);
///
/// let merged = merge(&canonical, &discovered);
/// assert_eq!(merged.ids("table"), &[50000, 50001, 50002]);
/// ```
pub fn merge(canonical: &ConsumptionSet, discovered: &ConsumptionSet) -> ConsumptionSet {
    canonical.merge(discovered)
}

/// Linear union of two strictly increasing sequences.
pub(crate) fn union_sorted(left: &[ObjectId], right: &[ObjectId]) -> Vec<ObjectId> {
    let mut out = Vec::with_capacity(left.len().max(right.len()));
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            Ordering::Less => {
                out.push(left[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(right[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(left[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    out
}

/// Linear difference `left \ right` of two strictly increasing sequences.
pub(crate) fn difference_sorted(left: &[ObjectId], right: &[ObjectId]) -> Vec<ObjectId> {
    let mut out = Vec::new();
    let mut j = 0;
    for &id in left {
        while j < right.len() && right[j] < id {
            j += 1;
        }
        if right.get(j) != Some(&id) {
            out.push(id);
        }
    }
    out
}
