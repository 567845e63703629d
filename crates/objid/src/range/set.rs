use core::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{ObjectId, RangeError};

/// An inclusive range of object IDs, `from..=to`.
///
/// A bare `Range` carries no guarantees. Ranges only become trustworthy once
/// they pass through [`RangeSet::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    pub from: ObjectId,
    pub to: ObjectId,
}

impl Range {
    pub const fn new(from: ObjectId, to: ObjectId) -> Self {
        Self { from, to }
    }

    /// Returns `true` if `id` falls within this range.
    pub const fn contains(&self, id: ObjectId) -> bool {
        self.from <= id && id <= self.to
    }

    /// Number of IDs covered by this range. Inverted ranges are empty.
    pub const fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            (self.to - self.from) as u64 + 1
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// A validated, normalized set of ID ranges for one application.
///
/// ## Invariants
/// - at least one range
/// - no boundary is zero
/// - `from <= to` for every range
/// - sorted ascending by `from`
/// - no range's `from` is below the previous range's `to`
///
/// A `RangeSet` is configuration supplied fresh with every request; it is
/// immutable once validated. Deserializing (with the `serde` feature) runs the
/// same validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<Range>", into = "Vec<Range>")
)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    /// Validates `ranges` and returns them sorted ascending by `from`.
    ///
    /// This is a pure function. Validating an already validated set yields the
    /// same set.
    ///
    /// # Errors
    ///
    /// - [`RangeError::EmptyRangeSet`] if `ranges` is empty
    /// - [`RangeError::ZeroBoundary`] if any boundary is zero
    /// - [`RangeError::InvertedRange`] if any `to` is below its `from`
    /// - [`RangeError::OverlappingRanges`] if, once sorted, any `from` is below
    ///   the previous range's `to`
    ///
    /// # Example
    /// ```
    /// use objid::{Range, RangeSet};
    ///
    /// let set = RangeSet::new(vec![Range::new(60_000, 60_049), Range::new(50_000, 50_099)]).unwrap();
    /// assert_eq!(set.first().from, 50_000);
    /// assert_eq!(set.span(), 150);
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, err))]
    pub fn new(ranges: impl Into<Vec<Range>>) -> Result<Self, RangeError> {
        let mut ranges = ranges.into();
        if ranges.is_empty() {
            return Err(RangeError::EmptyRangeSet);
        }

        for (index, range) in ranges.iter().enumerate() {
            if range.from == 0 || range.to == 0 {
                return Err(RangeError::ZeroBoundary { index });
            }
            if range.to < range.from {
                return Err(RangeError::InvertedRange {
                    index,
                    from: range.from,
                    to: range.to,
                });
            }
        }

        ranges.sort_by_key(|range| range.from);

        if let Some(pair) = ranges.windows(2).find(|pair| pair[1].from < pair[0].to) {
            return Err(RangeError::OverlappingRanges {
                previous: pair[0],
                range: pair[1],
            });
        }

        Ok(Self { ranges })
    }

    /// Validates a JSON value as a range specification.
    ///
    /// Unlike deserializing into `Vec<Range>`, this reports every failure in
    /// the [`RangeError`] vocabulary, including non-array input and elements
    /// that lack integer `from`/`to` properties.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::NotAnArray`] or [`RangeError::MalformedRange`]
    /// for structural problems, then anything [`Self::new`] returns.
    #[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
    #[cfg(feature = "serde")]
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RangeError> {
        let items = value.as_array().ok_or(RangeError::NotAnArray)?;
        let ranges = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let object = item
                    .as_object()
                    .ok_or(RangeError::MalformedRange { index })?;
                let bound = |key: &str| {
                    object
                        .get(key)
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|n| ObjectId::try_from(n).ok())
                        .ok_or(RangeError::MalformedRange { index })
                };
                Ok(Range::new(bound("from")?, bound("to")?))
            })
            .collect::<Result<Vec<_>, RangeError>>()?;
        Self::new(ranges)
    }

    /// The ranges in ascending order.
    pub fn as_slice(&self) -> &[Range] {
        &self.ranges
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Range> {
        self.ranges.iter()
    }

    /// The lowest range. A validated set is never empty.
    pub fn first(&self) -> Range {
        self.ranges[0]
    }

    /// Number of ranges in the set.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always `false`; present for API symmetry with [`Self::len`].
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of IDs covered by all ranges.
    pub fn span(&self) -> u64 {
        self.ranges.iter().map(Range::len).sum()
    }

    /// Returns `true` if any range covers `id`.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.range_of(id).is_some()
    }

    /// Returns the range covering `id`, if any.
    pub fn range_of(&self, id: ObjectId) -> Option<Range> {
        let idx = self.ranges.partition_point(|range| range.from <= id);
        self.ranges[..idx]
            .last()
            .filter(|range| range.contains(id))
            .copied()
    }

    pub fn to_vec(&self) -> Vec<Range> {
        self.ranges.clone()
    }
}

impl TryFrom<Vec<Range>> for RangeSet {
    type Error = RangeError;

    fn try_from(ranges: Vec<Range>) -> Result<Self, Self::Error> {
        Self::new(ranges)
    }
}

impl From<RangeSet> for Vec<Range> {
    fn from(set: RangeSet) -> Self {
        set.ranges
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a Range;
    type IntoIter = core::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}
