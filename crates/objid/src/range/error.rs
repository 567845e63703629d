/// Why a range specification was rejected.
///
/// The variants form the validation vocabulary shared with request-validation
/// layers. `Display` renders the human-readable message such a layer may show
/// as-is. Indices refer to positions in the input as supplied, before sorting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum RangeError {
    /// The input was not a sequence.
    #[error("Invalid ranges specification: array of ranges expected")]
    NotAnArray,

    /// The sequence had no elements.
    #[error("Invalid ranges specification: at least one range is required")]
    EmptyRangeSet,

    /// An element was not an object with integer `from` and `to` properties.
    #[error(
        "Invalid ranges specification: element {index} must have \"from\" and \"to\" properties of type number"
    )]
    MalformedRange {
        /// Position of the offending element.
        index: usize,
    },

    /// A boundary was zero, which is reserved as the "no ID" sentinel.
    #[error("Invalid ranges specification: \"from\" and \"to\" must not be 0 (element {index})")]
    ZeroBoundary {
        /// Position of the offending element.
        index: usize,
    },

    /// `to` was lower than `from`.
    #[error(
        "Invalid ranges specification: \"from\" must not be higher than \"to\" ({from}..{to}, element {index})"
    )]
    InvertedRange {
        /// Position of the offending element.
        index: usize,
        from: u32,
        to: u32,
    },

    /// Two ranges overlap once sorted by `from`.
    #[error("Invalid ranges specification: ranges must not be overlapping ({previous} overlaps {range})")]
    OverlappingRanges {
        /// The earlier range in sorted order.
        previous: crate::Range,
        /// The range whose `from` falls below `previous.to`.
        range: crate::Range,
    },
}
