//! Ordered store keys.

use crate::error::{StorageError, StorageResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// A key usable as a primary key, index key or range bound.
///
/// Keys are totally ordered: every number sorts before every text string,
/// text before bytes, and bytes before arrays. Arrays compare element by
/// element, then by length.
#[derive(Debug, Clone)]
pub enum Key {
    /// Numeric key.
    ///
    /// Build these with [`Key::number`] or `From`, which reject NaN. A
    /// `-0.0` built directly still compares equal to `0.0`.
    Number(f64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Array key (compound key paths produce these).
    Array(Vec<Key>),
}

impl Key {
    /// Creates a numeric key.
    ///
    /// # Errors
    ///
    /// Returns `DataError` for NaN.
    pub fn number(n: f64) -> StorageResult<Self> {
        if n.is_nan() {
            return Err(StorageError::data("NaN is not a valid key"));
        }
        Ok(Key::Number(fold_zero(n)))
    }

    /// Converts a value into a key.
    ///
    /// # Errors
    ///
    /// Returns `DataError` for null, booleans, maps, NaN, and arrays
    /// containing any of those.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_value(value: &Value) -> StorageResult<Self> {
        match value {
            Value::Integer(n) => Self::number(*n as f64),
            Value::Float(n) => Self::number(*n),
            Value::Text(s) => Ok(Key::Text(s.clone())),
            Value::Bytes(b) => Ok(Key::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<StorageResult<Vec<_>>>()
                .map(Key::Array),
            Value::Null => Err(StorageError::data("null is not a valid key")),
            Value::Bool(_) => Err(StorageError::data("boolean is not a valid key")),
            Value::Map(_) => Err(StorageError::data("map is not a valid key")),
        }
    }

    /// Converts this key back into a value.
    ///
    /// Whole numbers within the `i64` range come back as integers.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::Integer(*n as i64)
                } else {
                    Value::Float(*n)
                }
            }
            Key::Text(s) => Value::Text(s.clone()),
            Key::Bytes(b) => Value::Bytes(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Returns the numeric value for number keys.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Text(_) => 1,
            Key::Bytes(_) => 2,
            Key::Array(_) => 3,
        }
    }
}

/// Maps `-0.0` to `0.0`.
fn fold_zero(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => fold_zero(*a).total_cmp(&fold_zero(*b)),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Bytes(a), Key::Bytes(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}
