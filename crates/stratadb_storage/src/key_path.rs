//! Key paths: where a key lives inside a record.

use crate::error::{StorageError, StorageResult};
use crate::key::Key;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Location of a key inside a record.
///
/// A single path is a dotted field traversal (`"address.city"`); the empty
/// string refers to the record itself. A compound path evaluates every
/// member path and yields an array key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// One dotted path.
    Single(String),
    /// Several dotted paths forming an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Creates a single key path.
    pub fn single(path: impl Into<String>) -> Self {
        KeyPath::Single(path.into())
    }

    /// Evaluates the path against a record.
    ///
    /// Returns `None` when any segment is missing.
    #[must_use]
    pub fn evaluate(&self, record: &Value) -> Option<Value> {
        match self {
            KeyPath::Single(path) => lookup(record, path).cloned(),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|p| lookup(record, p).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Evaluates the path and converts the result into a key.
    ///
    /// Returns `Ok(None)` when the path does not resolve.
    ///
    /// # Errors
    ///
    /// Returns `DataError` when the resolved value is not a valid key.
    pub fn extract_key(&self, record: &Value) -> StorageResult<Option<Key>> {
        self.evaluate(record)
            .map(|value| Key::from_value(&value))
            .transpose()
    }

    /// Writes `key` into `record` at this path, creating intermediate maps.
    ///
    /// # Errors
    ///
    /// Returns `DataError` for compound paths, the empty path, or when a
    /// segment crosses a non-map value.
    pub fn inject(&self, record: &mut Value, key: &Key) -> StorageResult<()> {
        let KeyPath::Single(path) = self else {
            return Err(StorageError::data("cannot inject into a compound key path"));
        };
        if path.is_empty() {
            return Err(StorageError::data("cannot inject into the empty key path"));
        }

        let mut current = record;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Map(fields) = current else {
                return Err(StorageError::data(format!(
                    "key path {path} crosses a non-map value"
                )));
            };
            if segments.peek().is_none() {
                fields.insert(segment.to_string(), key.to_value());
                return Ok(());
            }
            current = fields
                .entry(segment.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
        }
        Ok(())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{path}"),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.').try_fold(record, |value, segment| value.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Value {
        Value::map([
            ("id", Value::from(7)),
            (
                "address",
                Value::map([("city", Value::from("Lisbon"))]),
            ),
        ])
    }

    #[test]
    fn single_path_lookup() {
        assert_eq!(KeyPath::from("id").evaluate(&user()), Some(Value::from(7)));
        assert_eq!(
            KeyPath::from("address.city").evaluate(&user()),
            Some(Value::from("Lisbon"))
        );
        assert_eq!(KeyPath::from("address.zip").evaluate(&user()), None);
    }

    #[test]
    fn empty_path_is_the_record() {
        assert_eq!(KeyPath::from("").evaluate(&Value::from(3)), Some(Value::from(3)));
    }

    #[test]
    fn compound_path_builds_array() {
        let path = KeyPath::Compound(vec!["id".into(), "address.city".into()]);
        let key = path.extract_key(&user()).unwrap().unwrap();
        assert_eq!(key, Key::Array(vec![Key::from(7), Key::from("Lisbon")]));
    }

    #[test]
    fn compound_path_missing_member_is_none() {
        let path = KeyPath::Compound(vec!["id".into(), "nope".into()]);
        assert_eq!(path.evaluate(&user()), None);
    }

    #[test]
    fn extract_key_rejects_invalid_key() {
        let record = Value::map([("flag", Value::from(true))]);
        assert!(KeyPath::from("flag").extract_key(&record).is_err());
    }

    #[test]
    fn inject_creates_nested_maps() {
        let mut record = Value::empty_map();
        KeyPath::from("meta.id")
            .inject(&mut record, &Key::from(42))
            .unwrap();
        assert_eq!(
            KeyPath::from("meta.id").evaluate(&record),
            Some(Value::from(42))
        );
    }

    #[test]
    fn inject_rejects_compound() {
        let mut record = Value::empty_map();
        let path = KeyPath::Compound(vec!["a".into()]);
        assert!(path.inject(&mut record, &Key::from(1)).is_err());
    }

    #[test]
    fn untagged_encoding_round_trips() {
        for path in [
            KeyPath::from("email"),
            KeyPath::Compound(vec!["a".into(), "b".into()]),
        ] {
            let mut buf = Vec::new();
            ciborium::into_writer(&path, &mut buf).unwrap();
            let decoded: KeyPath = ciborium::from_reader(buf.as_slice()).unwrap();
            assert_eq!(decoded, path);
        }
    }
}
