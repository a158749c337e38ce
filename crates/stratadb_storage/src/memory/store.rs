//! Object store data held by the in-memory host.

use crate::backend::{IndexParams, StoreParams};
use crate::error::{StorageError, StorageResult};
use crate::key::Key;
use crate::range::KeyRange;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Records and indexes of one object store.
///
/// Records are kept CBOR-encoded so callers never share memory with the
/// stored copy.
#[derive(Debug, Clone)]
pub(crate) struct ObjectStore {
    params: StoreParams,
    records: BTreeMap<Key, Vec<u8>>,
    indexes: BTreeMap<String, IndexData>,
    /// Next key handed out by the key generator.
    next_key: u64,
    /// Changes whenever a committed write replaces this store.
    pub(crate) generation: u64,
}

#[derive(Debug, Clone)]
struct IndexData {
    params: IndexParams,
    /// Index key to the primary keys of the records carrying it.
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl ObjectStore {
    pub(crate) fn new(params: StoreParams, generation: u64) -> Self {
        Self {
            params,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
            generation,
        }
    }

    pub(crate) fn params(&self) -> &StoreParams {
        &self.params
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub(crate) fn create_index(&mut self, store: &str, params: IndexParams) -> StorageResult<()> {
        if self.indexes.contains_key(&params.name) {
            return Err(StorageError::constraint(format!(
                "index {} already exists on {store}",
                params.name
            )));
        }

        let mut index = IndexData {
            params,
            entries: BTreeMap::new(),
        };
        for (primary, bytes) in &self.records {
            let record = decode(bytes)?;
            for key in index.keys_for(&record) {
                index.check_unique(&key, primary)?;
                index.entries.entry(key).or_default().insert(primary.clone());
            }
        }
        self.indexes.insert(index.params.name.clone(), index);
        Ok(())
    }

    pub(crate) fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        self.records.get(key).map(|bytes| decode(bytes)).transpose()
    }

    pub(crate) fn get_all(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        scan(&self.records, range)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    pub(crate) fn keys(&self, range: Option<&KeyRange>, limit: Option<usize>) -> Vec<Key> {
        scan(&self.records, range)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> usize {
        scan(&self.records, range).count()
    }

    pub(crate) fn index_keys(
        &self,
        index: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Key>> {
        let index = self.index(index)?;
        Ok(scan(&index.entries, range)
            .flat_map(|(_, primaries)| primaries.iter().cloned())
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub(crate) fn index_get_all(
        &self,
        index: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        self.index_keys(index, range, limit)?
            .iter()
            .filter_map(|primary| self.records.get(primary))
            .map(|bytes| decode(bytes))
            .collect()
    }

    pub(crate) fn index_count(
        &self,
        index: &str,
        range: Option<&KeyRange>,
    ) -> StorageResult<usize> {
        let index = self.index(index)?;
        Ok(scan(&index.entries, range)
            .map(|(_, primaries)| primaries.len())
            .sum())
    }

    /// Writes a record, resolving its key and maintaining every index.
    ///
    /// A generated in-line key is written into `value`. All constraint
    /// checks run before anything is modified.
    pub(crate) fn put(
        &mut self,
        value: &mut Value,
        key: Option<Key>,
        overwrite: bool,
    ) -> StorageResult<Key> {
        let primary = self.resolve_key(value, key)?;

        let existing = match self.records.get(&primary) {
            Some(_) if !overwrite => {
                return Err(StorageError::constraint(format!(
                    "key {primary} already exists"
                )));
            }
            Some(bytes) => Some(decode(bytes)?),
            None => None,
        };

        let mut index_keys = Vec::with_capacity(self.indexes.len());
        for (name, index) in &self.indexes {
            let keys = index.keys_for(value);
            for key in &keys {
                index.check_unique(key, &primary)?;
            }
            index_keys.push((name.clone(), keys));
        }

        let bytes = encode(value)?;

        if let Some(old) = existing {
            self.unindex(&primary, &old);
        }
        for (name, keys) in index_keys {
            if let Some(index) = self.indexes.get_mut(&name) {
                for key in keys {
                    index.entries.entry(key).or_default().insert(primary.clone());
                }
            }
        }
        self.records.insert(primary.clone(), bytes);
        Ok(primary)
    }

    pub(crate) fn delete(&mut self, range: &KeyRange) -> StorageResult<()> {
        let doomed: Vec<Key> = self.keys(Some(range), None);
        for primary in doomed {
            if let Some(bytes) = self.records.remove(&primary) {
                let old = decode(&bytes)?;
                self.unindex(&primary, &old);
            }
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    fn index(&self, name: &str) -> StorageResult<&IndexData> {
        self.indexes
            .get(name)
            .ok_or_else(|| StorageError::not_found(format!("index {name}")))
    }

    fn unindex(&mut self, primary: &Key, record: &Value) {
        for index in self.indexes.values_mut() {
            for key in index.keys_for(record) {
                if let Some(primaries) = index.entries.get_mut(&key) {
                    primaries.remove(primary);
                    if primaries.is_empty() {
                        index.entries.remove(&key);
                    }
                }
            }
        }
    }

    fn resolve_key(&mut self, value: &mut Value, explicit: Option<Key>) -> StorageResult<Key> {
        let key_path = self.params.key_path.clone();
        match (key_path, explicit) {
            (Some(_), Some(_)) => Err(StorageError::data(
                "store uses in-line keys; an explicit key is not allowed",
            )),
            (Some(path), None) => match path.extract_key(value)? {
                Some(key) => {
                    self.observe_key(&key);
                    Ok(key)
                }
                None if self.params.auto_increment => {
                    let key = self.generate_key()?;
                    path.inject(value, &key)?;
                    Ok(key)
                }
                None => Err(StorageError::data(format!(
                    "record has no key at key path {path}"
                ))),
            },
            (None, Some(key)) => {
                self.observe_key(&key);
                Ok(key)
            }
            (None, None) if self.params.auto_increment => self.generate_key(),
            (None, None) => Err(StorageError::data(
                "store has neither a key path nor a key generator; a key is required",
            )),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn generate_key(&mut self) -> StorageResult<Key> {
        // Keys stay exactly representable as f64.
        const MAX_GENERATED: u64 = 1 << 53;
        if self.next_key > MAX_GENERATED {
            return Err(StorageError::constraint("key generator exhausted"));
        }
        let key = self.next_key;
        self.next_key += 1;
        Key::number(key as f64)
    }

    /// Explicit numeric keys push the generator past them.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn observe_key(&mut self, key: &Key) {
        if !self.params.auto_increment {
            return;
        }
        if let Some(n) = key.as_number() {
            if n >= self.next_key as f64 {
                self.next_key = (n.floor() as u64).saturating_add(1);
            }
        }
    }
}

impl IndexData {
    fn keys_for(&self, record: &Value) -> Vec<Key> {
        let Some(value) = self.params.key_path.evaluate(record) else {
            return Vec::new();
        };
        match value {
            Value::Array(items) if self.params.multi_entry => {
                let distinct: BTreeSet<Key> = items
                    .iter()
                    .filter_map(|item| Key::from_value(item).ok())
                    .collect();
                distinct.into_iter().collect()
            }
            other => Key::from_value(&other).ok().into_iter().collect(),
        }
    }

    fn check_unique(&self, key: &Key, primary: &Key) -> StorageResult<()> {
        if !self.params.unique {
            return Ok(());
        }
        match self.entries.get(key) {
            Some(owners) if owners.iter().any(|owner| owner != primary) => {
                Err(StorageError::constraint(format!(
                    "unique index {} already contains {key}",
                    self.params.name
                )))
            }
            _ => Ok(()),
        }
    }
}

fn scan<'a, V>(
    map: &'a BTreeMap<Key, V>,
    range: Option<&KeyRange>,
) -> Box<dyn Iterator<Item = (&'a Key, &'a V)> + 'a> {
    match range {
        Some(range) => Box::new(map.range::<Key, _>(range.to_bounds())),
        None => Box::new(map.iter()),
    }
}

pub(crate) fn encode(value: &Value) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> StorageResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> ObjectStore {
        let mut store = ObjectStore::new(StoreParams::key_path("id"), 1);
        store
            .create_index("users", IndexParams::new("email", "email").unique(true))
            .unwrap();
        store
            .create_index("users", IndexParams::new("tags", "tags").multi_entry(true))
            .unwrap();
        store
    }

    fn user(id: i64, email: &str, tags: &[&str]) -> Value {
        Value::map([
            ("id", Value::from(id)),
            ("email", Value::from(email)),
            (
                "tags",
                Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
            ),
        ])
    }

    #[test]
    fn put_and_get() {
        let mut store = users();
        let key = store
            .put(&mut user(1, "a@x.com", &[]), None, true)
            .unwrap();
        assert_eq!(key, Key::from(1));
        let stored = store.get(&key).unwrap().unwrap();
        assert_eq!(stored.get("email"), Some(&Value::from("a@x.com")));
    }

    #[test]
    fn add_rejects_existing_key() {
        let mut store = users();
        store.put(&mut user(1, "a@x.com", &[]), None, false).unwrap();
        let err = store
            .put(&mut user(1, "b@x.com", &[]), None, false)
            .unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn unique_index_rejects_second_owner() {
        let mut store = users();
        store.put(&mut user(1, "a@x.com", &[]), None, true).unwrap();
        let err = store
            .put(&mut user(2, "a@x.com", &[]), None, true)
            .unwrap_err();
        assert!(err.is_constraint());
        assert_eq!(store.count(None), 1);
    }

    #[test]
    fn replacing_own_record_keeps_unique_key() {
        let mut store = users();
        store.put(&mut user(1, "a@x.com", &[]), None, true).unwrap();
        store.put(&mut user(1, "a@x.com", &["new"]), None, true).unwrap();
        assert_eq!(store.index_count("tags", None).unwrap(), 1);
    }

    #[test]
    fn replacing_record_drops_old_index_entries() {
        let mut store = users();
        store.put(&mut user(1, "a@x.com", &[]), None, true).unwrap();
        store.put(&mut user(1, "b@x.com", &[]), None, true).unwrap();
        let range = KeyRange::only(Key::from("a@x.com"));
        assert_eq!(store.index_count("email", Some(&range)).unwrap(), 0);
        store.put(&mut user(2, "a@x.com", &[]), None, true).unwrap();
    }

    #[test]
    fn multi_entry_indexes_each_distinct_element() {
        let mut store = users();
        store
            .put(&mut user(1, "a@x.com", &["red", "blue", "red"]), None, true)
            .unwrap();
        store.put(&mut user(2, "b@x.com", &["red"]), None, true).unwrap();
        let red = KeyRange::only(Key::from("red"));
        assert_eq!(store.index_count("tags", Some(&red)).unwrap(), 2);
        assert_eq!(store.index_count("tags", None).unwrap(), 3);
    }

    #[test]
    fn missing_index_value_is_not_indexed() {
        let mut store = users();
        let mut record = Value::map([("id", Value::from(1))]);
        store.put(&mut record, None, true).unwrap();
        assert_eq!(store.index_count("email", None).unwrap(), 0);
    }

    #[test]
    fn in_line_store_rejects_explicit_key() {
        let mut store = users();
        let err = store
            .put(&mut user(1, "a@x.com", &[]), Some(Key::from(1)), true)
            .unwrap_err();
        assert!(matches!(err, StorageError::DataError { .. }));
    }

    #[test]
    fn key_generator_counts_from_one_and_skips_explicit_keys() {
        let mut store = ObjectStore::new(StoreParams::auto_increment(), 1);
        let first = store.put(&mut Value::from("a"), None, true).unwrap();
        assert_eq!(first, Key::from(1));
        store
            .put(&mut Value::from("b"), Some(Key::from(10)), true)
            .unwrap();
        let next = store.put(&mut Value::from("c"), None, true).unwrap();
        assert_eq!(next, Key::from(11));
    }

    #[test]
    fn generated_key_is_injected_for_in_line_paths() {
        let mut store = ObjectStore::new(
            StoreParams {
                key_path: Some("id".into()),
                auto_increment: true,
            },
            1,
        );
        let mut record = Value::map([("name", Value::from("x"))]);
        let key = store.put(&mut record, None, true).unwrap();
        assert_eq!(record.get("id"), Some(&key.to_value()));
    }

    #[test]
    fn delete_range_removes_records_and_index_entries() {
        let mut store = users();
        for id in 1..=5 {
            store
                .put(&mut user(id, &format!("{id}@x.com"), &["t"]), None, true)
                .unwrap();
        }
        let range = KeyRange::bound(Key::from(2), Key::from(4), false, false).unwrap();
        store.delete(&range).unwrap();
        assert_eq!(store.keys(None, None), vec![Key::from(1), Key::from(5)]);
        assert_eq!(store.index_count("tags", None).unwrap(), 2);
    }

    #[test]
    fn create_index_over_existing_data() {
        let mut store = ObjectStore::new(StoreParams::key_path("id"), 1);
        store.put(&mut user(1, "a@x.com", &[]), None, true).unwrap();
        store.put(&mut user(2, "a@x.com", &[]), None, true).unwrap();
        let err = store
            .create_index("users", IndexParams::new("email", "email").unique(true))
            .unwrap_err();
        assert!(err.is_constraint());
        store
            .create_index("users", IndexParams::new("email", "email"))
            .unwrap();
        assert_eq!(store.index_count("email", None).unwrap(), 2);
    }

    #[test]
    fn get_all_respects_range_and_limit() {
        let mut store = users();
        for id in 1..=10 {
            store
                .put(&mut user(id, &format!("{id}@x.com"), &[]), None, true)
                .unwrap();
        }
        let range = KeyRange::lower_bound(Key::from(5), true);
        let values = store.get_all(Some(&range), Some(3)).unwrap();
        let ids: Vec<_> = values.iter().map(|v| v.get("id").cloned()).collect();
        assert_eq!(
            ids,
            vec![Some(Value::from(6)), Some(Value::from(7)), Some(Value::from(8))]
        );
    }

    #[test]
    fn unknown_index_is_not_found() {
        let store = users();
        assert!(matches!(
            store.index_count("nope", None),
            Err(StorageError::NotFound { .. })
        ));
    }
}
