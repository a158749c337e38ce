//! Host store traits.
//!
//! A host is a versioned key-value store organised as named databases, each
//! holding object stores with secondary indexes. Structural changes happen
//! only inside the upgrade callback passed to [`StoreBackend::open`]; data
//! access happens inside transactions scoped to a fixed set of stores.

use crate::error::StorageResult;
use crate::key::Key;
use crate::key_path::KeyPath;
use crate::range::KeyRange;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionMode {
    /// Reads only; writes fail with `ReadOnly`.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadOnly => write!(f, "readonly"),
            TransactionMode::ReadWrite => write!(f, "readwrite"),
        }
    }
}

/// Key configuration of an object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParams {
    /// In-line key location. `None` means keys are supplied out of line.
    pub key_path: Option<KeyPath>,
    /// Whether the store generates keys when none is supplied.
    pub auto_increment: bool,
}

impl StoreParams {
    /// Keys read from the record at `key_path`.
    pub fn key_path(key_path: impl Into<KeyPath>) -> Self {
        Self {
            key_path: Some(key_path.into()),
            auto_increment: false,
        }
    }

    /// Keys generated by the store.
    #[must_use]
    pub fn auto_increment() -> Self {
        Self {
            key_path: None,
            auto_increment: true,
        }
    }
}

/// Configuration of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    /// Index name, unique within its store.
    pub name: String,
    /// Where the indexed value lives in each record.
    pub key_path: KeyPath,
    /// Whether two records may share an index key.
    pub unique: bool,
    /// Whether array values index each element separately.
    pub multi_entry: bool,
}

impl IndexParams {
    /// Creates a non-unique, single-entry index.
    pub fn new(name: impl Into<String>, key_path: impl Into<KeyPath>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
            multi_entry: false,
        }
    }

    /// Sets uniqueness.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets multi-entry behaviour.
    #[must_use]
    pub fn multi_entry(mut self, multi_entry: bool) -> Self {
        self.multi_entry = multi_entry;
        self
    }
}

/// Notification sent to open connections when another party changes the
/// database version or deletes the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChangeEvent {
    /// Version the connection was opened at.
    pub old_version: u64,
    /// Requested version, or `None` when the database is being deleted.
    pub new_version: Option<u64>,
}

impl VersionChangeEvent {
    /// Returns true when the event announces a deletion.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.new_version.is_none()
    }
}

/// Callback invoked on version change events.
pub type VersionChangeHandler = Box<dyn Fn(&VersionChangeEvent) + Send + Sync>;

/// Structural operations available during an upgrade.
///
/// Every change made through the editor commits together with the new
/// version, or not at all.
pub trait SchemaEditor {
    /// Version stored before this upgrade (0 for a new database).
    fn old_version(&self) -> u64;

    /// Version being upgraded to.
    fn new_version(&self) -> u64;

    /// Names of the object stores currently present.
    fn store_names(&self) -> Vec<String>;

    /// Checks whether an object store exists.
    fn contains_store(&self, name: &str) -> bool;

    /// Creates an object store.
    ///
    /// # Errors
    ///
    /// `ConstraintError` if the store exists; `InvalidAccess` for key
    /// configurations the host cannot support.
    fn create_store(&mut self, name: &str, params: StoreParams) -> StorageResult<()>;

    /// Deletes an object store and all of its data and indexes.
    ///
    /// # Errors
    ///
    /// `NotFound` if the store does not exist.
    fn delete_store(&mut self, name: &str) -> StorageResult<()>;

    /// Creates an index on an existing store, indexing current records.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing store, `ConstraintError` if the index exists
    /// or existing records violate uniqueness.
    fn create_index(&mut self, store: &str, params: IndexParams) -> StorageResult<()>;

    /// Names of the indexes on a store.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing store.
    fn index_names(&self, store: &str) -> StorageResult<Vec<String>>;
}

/// Upgrade callback passed to [`StoreBackend::open`].
pub type UpgradeCallback<'a> = dyn FnMut(&mut dyn SchemaEditor) -> StorageResult<()> + 'a;

/// A host store holding named, versioned databases.
pub trait StoreBackend: Send + Sync {
    /// Opens `name` at `version`.
    ///
    /// When `version` exceeds the stored version the host runs `upgrade`
    /// exclusively before the open completes. Changes made by the callback
    /// and the version bump commit atomically.
    ///
    /// # Errors
    ///
    /// `InvalidVersion` for version 0, `VersionError` when `version` is lower
    /// than the stored version, `Blocked` when other connections stay open
    /// through the version change, or whatever the callback returned.
    fn open(
        &self,
        name: &str,
        version: u64,
        upgrade: &mut UpgradeCallback<'_>,
    ) -> StorageResult<Arc<dyn BackendConnection>>;

    /// Deletes a database, notifying open connections first.
    ///
    /// # Errors
    ///
    /// `Blocked` when a connection stays open after being notified.
    fn delete_database(&self, name: &str) -> StorageResult<()>;

    /// Returns the stored version of a database, if it exists.
    fn database_version(&self, name: &str) -> Option<u64>;

    /// Returns the names of all databases.
    fn database_names(&self) -> Vec<String>;
}

/// A live connection to one database.
pub trait BackendConnection: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the connection was opened at.
    fn version(&self) -> u64;

    /// Names of the object stores in the database.
    fn store_names(&self) -> Vec<String>;

    /// Starts a transaction over `scope`.
    ///
    /// # Errors
    ///
    /// `Closed` on a closed connection, `InvalidAccess` for an empty scope,
    /// `NotFound` for an unknown store.
    fn transaction(
        &self,
        scope: &[&str],
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn BackendTransaction>>;

    /// Installs the handler for version change events, replacing any
    /// previous one.
    fn set_version_change_handler(&self, handler: VersionChangeHandler);

    /// Closes the connection. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Host specific failures to release the connection.
    fn close(&self) -> StorageResult<()>;

    /// Returns true once the connection is closed.
    fn is_closed(&self) -> bool;
}

/// A transaction over a fixed set of object stores.
///
/// Requests take effect immediately inside the transaction. Nothing becomes
/// visible to other transactions until [`BackendTransaction::commit`].
pub trait BackendTransaction: Send {
    /// Access mode.
    fn mode(&self) -> TransactionMode;

    /// Stores this transaction may touch.
    fn scope(&self) -> &[String];

    /// Reads the record stored under `key`.
    fn get(&self, store: &str, key: &Key) -> StorageResult<Option<Value>>;

    /// Reads records in key order.
    fn get_all(
        &self,
        store: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>>;

    /// Reads primary keys in order.
    fn get_all_keys(
        &self,
        store: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Key>>;

    /// Counts records.
    fn count(&self, store: &str, range: Option<&KeyRange>) -> StorageResult<usize>;

    /// Reads records through an index, in index key order.
    fn index_get_all(
        &self,
        store: &str,
        index: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>>;

    /// Reads primary keys through an index, in index key order.
    fn index_get_all_keys(
        &self,
        store: &str,
        index: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Key>>;

    /// Counts index entries.
    fn index_count(
        &self,
        store: &str,
        index: &str,
        range: Option<&KeyRange>,
    ) -> StorageResult<usize>;

    /// Inserts or replaces a record. Returns its primary key.
    fn put(&mut self, store: &str, value: Value, key: Option<Key>) -> StorageResult<Key>;

    /// Inserts a record, failing with `ConstraintError` if the key exists.
    fn add(&mut self, store: &str, value: Value, key: Option<Key>) -> StorageResult<Key>;

    /// Deletes every record in `range`.
    fn delete(&mut self, store: &str, range: &KeyRange) -> StorageResult<()>;

    /// Deletes every record in the store.
    fn clear(&mut self, store: &str) -> StorageResult<()>;

    /// Commits all writes.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented the commit; nothing was applied.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards all writes.
    fn abort(self: Box<Self>);
}
