use crate::ObjectType;

/// Why a consumption specification was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConsumptionError {
    /// The input was not a map from object type to IDs.
    #[error("Invalid object ids specification: object expected")]
    NotAnObject,

    /// The entry for an object type was not an array.
    #[error("Invalid object ids specification: array of number expected for \"{object_type}\"")]
    ArrayExpected { object_type: ObjectType },

    /// An entry contained something other than a non-negative 32-bit integer.
    #[error(
        "Invalid object ids specification: element {index} of \"{object_type}\" is not a valid object id"
    )]
    InvalidId {
        object_type: ObjectType,
        index: usize,
    },
}
