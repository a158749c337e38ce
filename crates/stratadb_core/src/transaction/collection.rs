//! Collection and index handles scoped to a transaction.

use super::state::TxnShared;
use crate::error::{CoreError, CoreResult};
use crate::key_range::{build_range, to_key, QueryOp};
use crate::schema::{CollectionSchema, FieldSchema};
use stratadb_storage::{Key, KeyRange, Value};

/// A collection inside a transaction.
///
/// Every request runs immediately against the transaction's view of the
/// store. A request the host rejects settles the whole transaction as
/// failed and returns [`CoreError::Transaction`]; malformed keys are
/// rejected up front with [`CoreError::InvalidKey`] and leave the
/// transaction untouched.
#[derive(Debug, Clone, Copy)]
pub struct Collection<'t> {
    txn: &'t TxnShared,
    schema: &'t CollectionSchema,
}

impl<'t> Collection<'t> {
    pub(crate) fn new(txn: &'t TxnShared, schema: &'t CollectionSchema) -> Self {
        Self { txn, schema }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &'t str {
        &self.schema.name
    }

    /// Declared schema of this collection.
    #[must_use]
    pub fn schema(&self) -> &'t CollectionSchema {
        self.schema
    }

    /// Reads the record stored under `key`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for a value that is not a key, `Transaction` on host
    /// failure.
    pub fn get(&self, key: &Value) -> CoreResult<Option<Value>> {
        let key = to_key(key)?;
        self.txn.run(|tx| tx.get(self.name(), &key))
    }

    /// Reads records in primary key order.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn get_all(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Value>> {
        self.txn.run(|tx| tx.get_all(self.name(), range, limit))
    }

    /// Reads primary keys in order.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn get_all_keys(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Key>> {
        self.txn.run(|tx| tx.get_all_keys(self.name(), range, limit))
    }

    /// Counts records.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn count(&self, range: Option<&KeyRange>) -> CoreResult<usize> {
        self.txn.run(|tx| tx.count(self.name(), range))
    }

    /// Reads the records whose primary key matches `value` under `op`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for an unusable predicate, `Transaction` on host failure.
    pub fn query(&self, value: &Value, op: Option<QueryOp>) -> CoreResult<Vec<Value>> {
        let range = build_range(value, op)?;
        self.get_all(Some(&range), None)
    }

    /// Inserts or replaces a record, returning its primary key.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure, including uniqueness violations.
    pub fn put(&self, record: Value) -> CoreResult<Key> {
        self.txn.run(|tx| tx.put(self.name(), record, None))
    }

    /// Inserts or replaces a record under an explicit key.
    ///
    /// Only valid for collections without a primary key path.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for a value that is not a key, `Transaction` on host
    /// failure.
    pub fn put_with_key(&self, record: Value, key: &Value) -> CoreResult<Key> {
        let key = to_key(key)?;
        self.txn.run(|tx| tx.put(self.name(), record, Some(key)))
    }

    /// Inserts a record that must not exist yet.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure, including an existing key.
    pub fn add(&self, record: Value) -> CoreResult<Key> {
        self.txn.run(|tx| tx.add(self.name(), record, None))
    }

    /// Inserts a record under an explicit key that must not exist yet.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for a value that is not a key, `Transaction` on host
    /// failure.
    pub fn add_with_key(&self, record: Value, key: &Value) -> CoreResult<Key> {
        let key = to_key(key)?;
        self.txn.run(|tx| tx.add(self.name(), record, Some(key)))
    }

    /// Deletes every record in `range`.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn delete(&self, range: &KeyRange) -> CoreResult<()> {
        self.txn.run(|tx| tx.delete(self.name(), range))
    }

    /// Deletes the record stored under `key`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for a value that is not a key, `Transaction` on host
    /// failure.
    pub fn delete_key(&self, key: &Value) -> CoreResult<()> {
        let range = KeyRange::only(to_key(key)?);
        self.delete(&range)
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn clear(&self) -> CoreResult<()> {
        self.txn.run(|tx| tx.clear(self.name()))
    }

    /// Opens an index declared on this collection.
    ///
    /// # Errors
    ///
    /// `UnknownIndex` unless the schema declares `name` as a searchable
    /// field of this collection.
    pub fn index(&self, name: &str) -> CoreResult<IndexHandle<'t>> {
        let field = self
            .schema
            .indexes()
            .find(|f| f.name == name)
            .ok_or_else(|| CoreError::UnknownIndex {
                collection: self.schema.name.clone(),
                index: name.to_string(),
            })?;
        Ok(IndexHandle {
            txn: self.txn,
            collection: self.schema,
            field,
        })
    }
}

/// An index of a collection inside a transaction.
#[derive(Debug, Clone, Copy)]
pub struct IndexHandle<'t> {
    txn: &'t TxnShared,
    collection: &'t CollectionSchema,
    field: &'t FieldSchema,
}

impl<'t> IndexHandle<'t> {
    /// Index name.
    #[must_use]
    pub fn name(&self) -> &'t str {
        &self.field.name
    }

    /// Returns true when index keys are unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.field.unique || self.field.is_primary_key
    }

    /// Reads the first record whose index key equals `key`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for a value that is not a key, `Transaction` on host
    /// failure.
    pub fn get(&self, key: &Value) -> CoreResult<Option<Value>> {
        let range = KeyRange::only(to_key(key)?);
        Ok(self.get_all(Some(&range), Some(1))?.into_iter().next())
    }

    /// Reads records in index key order.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn get_all(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Value>> {
        self.txn
            .run(|tx| tx.index_get_all(&self.collection.name, self.name(), range, limit))
    }

    /// Reads primary keys in index key order.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn get_all_keys(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Key>> {
        self.txn
            .run(|tx| tx.index_get_all_keys(&self.collection.name, self.name(), range, limit))
    }

    /// Counts index entries.
    ///
    /// # Errors
    ///
    /// `Transaction` on host failure.
    pub fn count(&self, range: Option<&KeyRange>) -> CoreResult<usize> {
        self.txn
            .run(|tx| tx.index_count(&self.collection.name, self.name(), range))
    }

    /// Reads the records whose index key matches `value` under `op`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` for an unusable predicate, `Transaction` on host failure.
    pub fn query(
        &self,
        value: &Value,
        op: Option<QueryOp>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Value>> {
        let range = build_range(value, op)?;
        self.get_all(Some(&range), limit)
    }
}
