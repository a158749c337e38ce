//! Key ranges for scans over primary keys and indexes.

use crate::error::{StorageError, StorageResult};
use crate::key::Key;
use std::ops::{Bound, RangeBounds};

/// A contiguous interval of keys.
///
/// Either end may be unbounded, inclusive or exclusive. Ranges are plain
/// values: building one touches no store state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// A range matching exactly one key.
    #[must_use]
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// A range with a lower bound and no upper bound.
    #[must_use]
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: bound(key, open),
            upper: Bound::Unbounded,
        }
    }

    /// A range with an upper bound and no lower bound.
    #[must_use]
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: bound(key, open),
        }
    }

    /// A range bounded on both ends.
    ///
    /// # Errors
    ///
    /// Returns `DataError` if `lower > upper`, or if they are equal and
    /// either end is open.
    pub fn bound(
        lower: Key,
        upper: Key,
        lower_open: bool,
        upper_open: bool,
    ) -> StorageResult<Self> {
        if lower > upper {
            return Err(StorageError::data(format!(
                "lower bound {lower} is greater than upper bound {upper}"
            )));
        }
        if lower == upper && (lower_open || upper_open) {
            return Err(StorageError::data(format!(
                "range over {lower} is empty with an open end"
            )));
        }
        Ok(Self {
            lower: bound(lower, lower_open),
            upper: bound(upper, upper_open),
        })
    }

    /// A range with no bounds.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Returns the lower bound.
    #[must_use]
    pub fn lower(&self) -> &Bound<Key> {
        &self.lower
    }

    /// Returns the upper bound.
    #[must_use]
    pub fn upper(&self) -> &Bound<Key> {
        &self.upper
    }

    /// Returns true when the lower end excludes its key.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        matches!(self.lower, Bound::Excluded(_))
    }

    /// Returns true when the upper end excludes its key.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        matches!(self.upper, Bound::Excluded(_))
    }

    /// Checks whether `key` lies inside the range.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        self.contains(key)
    }

    /// Returns the bounds as a tuple usable with `BTreeMap::range`.
    #[must_use]
    pub fn to_bounds(&self) -> (Bound<Key>, Bound<Key>) {
        (self.lower.clone(), self.upper.clone())
    }
}

impl RangeBounds<Key> for KeyRange {
    fn start_bound(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    fn end_bound(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        Self::only(key)
    }
}

fn bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}
