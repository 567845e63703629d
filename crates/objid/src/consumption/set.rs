use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use crate::ConsumptionError;
use crate::{
    ObjectId, ObjectType,
    consumption::merge::{difference_sorted, union_sorted},
};

/// Consumed object IDs, keyed by object type.
///
/// ## Invariants
/// - within each type, IDs are strictly increasing (sorted, no duplicates)
/// - zero never appears
/// - types with no IDs are not stored, so equality is structural
///
/// A set is only ever changed by merging; the allocator consults it read-only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(
        from = "BTreeMap<ObjectType, Vec<ObjectId>>",
        into = "BTreeMap<ObjectType, Vec<ObjectId>>"
    )
)]
pub struct ConsumptionSet {
    entries: BTreeMap<ObjectType, Vec<ObjectId>>,
}

impl ConsumptionSet {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Builds a set from raw discovered data, e.g. IDs scraped from several
    /// folders or branches that may repeat or arrive out of order.
    ///
    /// IDs are sorted numerically and deduplicated; zeros are dropped.
    pub fn from_unsorted<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ObjectType>,
        V: IntoIterator<Item = ObjectId>,
    {
        let mut raw: BTreeMap<ObjectType, Vec<ObjectId>> = BTreeMap::new();
        for (object_type, ids) in entries {
            raw.entry(object_type.into()).or_default().extend(ids);
        }
        Self::from(raw)
    }

    /// Validates a JSON value as a consumption specification: an object whose
    /// values are arrays of non-negative integers.
    ///
    /// # Errors
    ///
    /// - [`ConsumptionError::NotAnObject`] if `value` is not a JSON object
    /// - [`ConsumptionError::ArrayExpected`] if an entry is not an array
    /// - [`ConsumptionError::InvalidId`] if an element is not a `u32`
    #[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
    #[cfg(feature = "serde")]
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConsumptionError> {
        let object = value.as_object().ok_or(ConsumptionError::NotAnObject)?;
        let mut raw = BTreeMap::new();
        for (key, ids) in object {
            let object_type = ObjectType::from(key.as_str());
            let ids = ids
                .as_array()
                .ok_or_else(|| ConsumptionError::ArrayExpected {
                    object_type: object_type.clone(),
                })?;
            let ids = ids
                .iter()
                .enumerate()
                .map(|(index, id)| {
                    id.as_u64()
                        .and_then(|n| ObjectId::try_from(n).ok())
                        .ok_or_else(|| ConsumptionError::InvalidId {
                            object_type: object_type.clone(),
                            index,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            raw.insert(object_type, ids);
        }
        Ok(Self::from(raw))
    }

    /// The consumed IDs for `object_type`, ascending. Unknown types have none.
    pub fn ids(&self, object_type: &str) -> &[ObjectId] {
        self.entries
            .get(object_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` if `id` is recorded as consumed for `object_type`.
    pub fn contains(&self, object_type: &str, id: ObjectId) -> bool {
        self.ids(object_type).binary_search(&id).is_ok()
    }

    /// Object types that have at least one consumed ID.
    pub fn types(&self) -> impl Iterator<Item = &ObjectType> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectType, &[ObjectId])> {
        self.entries
            .iter()
            .map(|(object_type, ids)| (object_type, ids.as_slice()))
    }

    /// Total number of consumed IDs across all types.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of `self` and `other`. See [`merge`](crate::merge).
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (object_type, ids) in &other.entries {
            match entries.get_mut(object_type) {
                Some(existing) => *existing = union_sorted(existing, ids),
                None => {
                    entries.insert(object_type.clone(), ids.clone());
                }
            }
        }
        Self { entries }
    }

    /// IDs present in `self` but absent from `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let entries = self
            .entries
            .iter()
            .filter_map(|(object_type, ids)| {
                let remaining = difference_sorted(ids, other.ids(object_type.as_str()));
                (!remaining.is_empty()).then(|| (object_type.clone(), remaining))
            })
            .collect();
        Self { entries }
    }
}

impl From<BTreeMap<ObjectType, Vec<ObjectId>>> for ConsumptionSet {
    fn from(mut raw: BTreeMap<ObjectType, Vec<ObjectId>>) -> Self {
        raw.retain(|_, ids| {
            ids.retain(|&id| id != 0);
            ids.sort_unstable();
            ids.dedup();
            !ids.is_empty()
        });
        Self { entries: raw }
    }
}

impl From<ConsumptionSet> for BTreeMap<ObjectType, Vec<ObjectId>> {
    fn from(set: ConsumptionSet) -> Self {
        set.entries
    }
}

impl FromIterator<(ObjectType, ObjectId)> for ConsumptionSet {
    fn from_iter<I: IntoIterator<Item = (ObjectType, ObjectId)>>(iter: I) -> Self {
        let mut raw: BTreeMap<ObjectType, Vec<ObjectId>> = BTreeMap::new();
        for (object_type, id) in iter {
            raw.entry(object_type).or_default().push(id);
        }
        Self::from(raw)
    }
}
