use core::{borrow::Borrow, fmt};

/// A numeric object ID.
///
/// Zero is reserved as the "no ID available" sentinel and is never
/// allocatable; APIs that may find nothing return `Option<ObjectId>` instead.
pub type ObjectId = u32;

macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Creates a new key from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_key!(
    /// Identifies one application (one manifest) across every workspace that
    /// declares it.
    AppId
);

define_key!(
    /// An artifact kind such as `table` or `codeunit`.
    ///
    /// The set of kinds is external configuration. The engine treats the value
    /// as an opaque key and never interprets it.
    ObjectType
);

define_key!(
    /// Identifies a pool of applications sharing one authoritative range set.
    PoolId
);
