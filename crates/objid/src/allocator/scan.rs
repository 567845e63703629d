use core::iter::FusedIterator;

use crate::{ObjectId, Range, RangeSet};

/// A lazy, ascending iterator over the free IDs of a [`RangeSet`].
///
/// The scan walks the ranges and the consumed IDs together in a single linear
/// pass, so it costs `O(span + consumed)` rather than a membership lookup per
/// candidate. IDs shared by two ranges that touch at a boundary are yielded
/// once.
///
/// # Example
/// ```
/// use objid::{FreeIds, Range, RangeSet};
///
/// let ranges = RangeSet::new(vec![Range::new(1, 5), Range::new(10, 15)]).unwrap();
/// let free: Vec<_> = FreeIds::new(&ranges, &[1, 2, 4]).take(3).collect();
/// assert_eq!(free, vec![3, 5, 10]);
/// ```
#[derive(Clone, Debug)]
pub struct FreeIds<'a> {
    ranges: core::slice::Iter<'a, Range>,
    window: Option<(ObjectId, ObjectId)>,
    consumed: &'a [ObjectId],
    cursor: usize,
    // Lowest candidate still allowed; widened to avoid overflow at `u32::MAX`.
    floor: u64,
}

impl<'a> FreeIds<'a> {
    /// Scans every range of `ranges`, skipping anything in `consumed`.
    ///
    /// `consumed` must be sorted ascending, as every
    /// [`ConsumptionSet`](crate::ConsumptionSet) entry is.
    pub fn new(ranges: &'a RangeSet, consumed: &'a [ObjectId]) -> Self {
        Self::over(ranges.as_slice(), consumed)
    }

    /// Scans a single range, skipping anything in `consumed`.
    pub fn within(range: &'a Range, consumed: &'a [ObjectId]) -> Self {
        Self::over(core::slice::from_ref(range), consumed)
    }

    fn over(ranges: &'a [Range], consumed: &'a [ObjectId]) -> Self {
        debug_assert!(consumed.is_sorted(), "consumed IDs must be sorted");
        // Everything below the first range is irrelevant; jump past it.
        let cursor = ranges
            .first()
            .map_or(0, |first| consumed.partition_point(|&id| id < first.from));
        Self {
            ranges: ranges.iter(),
            window: None,
            consumed,
            cursor,
            floor: 1,
        }
    }

    fn next_candidate(&mut self) -> Option<ObjectId> {
        loop {
            let (next, end) = match self.window {
                Some(window) => window,
                None => {
                    let range = self.ranges.next()?;
                    let start = u64::from(range.from).max(self.floor);
                    if start > u64::from(range.to) {
                        continue;
                    }
                    (start as ObjectId, range.to)
                }
            };
            self.window = (next < end).then(|| (next + 1, end));
            self.floor = u64::from(next) + 1;
            return Some(next);
        }
    }
}

impl Iterator for FreeIds<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        loop {
            let candidate = self.next_candidate()?;
            while self.cursor < self.consumed.len() && self.consumed[self.cursor] < candidate {
                self.cursor += 1;
            }
            if self.consumed.get(self.cursor) == Some(&candidate) {
                self.cursor += 1;
                continue;
            }
            return Some(candidate);
        }
    }
}

impl FusedIterator for FreeIds<'_> {}
