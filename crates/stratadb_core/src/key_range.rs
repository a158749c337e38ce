//! Translation of query predicates into key ranges.
//!
//! [`build_range`] is a pure function: it reads only its arguments and may be
//! called from any thread without coordination.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use stratadb_storage::{Key, KeyRange, Value};

/// Comparison operator of a query predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOp {
    /// Inclusive on both ends; the value is a map with `low` and `high`.
    Between,
    /// Strictly greater than the value.
    GreaterThan,
    /// Greater than or equal to the value.
    GreaterThanEqualTo,
    /// Strictly less than the value.
    LessThan,
    /// Less than or equal to the value.
    LessThanEqualTo,
}

impl QueryOp {
    /// Parses the symbolic form used by query commands.
    ///
    /// Returns `None` for anything unrecognized, which [`build_range`] treats
    /// as an exact match.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "-" => Some(Self::Between),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterThanEqualTo),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessThanEqualTo),
            _ => None,
        }
    }

    /// Returns the symbolic form.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Between => "-",
            Self::GreaterThan => ">",
            Self::GreaterThanEqualTo => ">=",
            Self::LessThan => "<",
            Self::LessThanEqualTo => "<=",
        }
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Builds the key range selected by `value` under `op`.
///
/// | operator | range |
/// |----------|-------|
/// | none | exactly `value` |
/// | `Between` | `[value.low, value.high]` |
/// | `GreaterThan` | `(value, +inf)` |
/// | `GreaterThanEqualTo` | `[value, +inf)` |
/// | `LessThan` | `(-inf, value)` |
/// | `LessThanEqualTo` | `(-inf, value]` |
///
/// # Errors
///
/// Returns `InvalidKey` if a bound is not a valid key, if a `Between` value
/// lacks `low` or `high`, or if `low > high`.
///
/// # Example
///
/// ```rust
/// use stratadb_core::{build_range, QueryOp};
/// use stratadb_storage::{Key, Value};
///
/// let range = build_range(&Value::from(18), Some(QueryOp::GreaterThanEqualTo)).unwrap();
/// assert!(range.includes(&Key::from(18)));
/// assert!(!range.includes(&Key::from(17)));
/// ```
pub fn build_range(value: &Value, op: Option<QueryOp>) -> CoreResult<KeyRange> {
    let range = match op {
        None => KeyRange::only(to_key(value)?),
        Some(QueryOp::Between) => {
            let low = between_end(value, "low")?;
            let high = between_end(value, "high")?;
            KeyRange::bound(low, high, false, false)
                .map_err(|err| CoreError::invalid_key(err.to_string()))?
        }
        Some(QueryOp::GreaterThan) => KeyRange::lower_bound(to_key(value)?, true),
        Some(QueryOp::GreaterThanEqualTo) => KeyRange::lower_bound(to_key(value)?, false),
        Some(QueryOp::LessThan) => KeyRange::upper_bound(to_key(value)?, true),
        Some(QueryOp::LessThanEqualTo) => KeyRange::upper_bound(to_key(value)?, false),
    };
    Ok(range)
}

/// Converts a value into a key, reporting failures as `InvalidKey`.
pub(crate) fn to_key(value: &Value) -> CoreResult<Key> {
    Key::from_value(value).map_err(|err| CoreError::invalid_key(err.to_string()))
}

fn between_end(value: &Value, end: &str) -> CoreResult<Key> {
    let bound = value
        .get(end)
        .ok_or_else(|| CoreError::invalid_key(format!("between range is missing `{end}`")))?;
    to_key(bound)
}
