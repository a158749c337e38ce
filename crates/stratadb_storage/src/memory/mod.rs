//! In-memory host store.

mod store;
mod transaction;

use crate::backend::{
    BackendConnection, BackendTransaction, IndexParams, SchemaEditor, StoreBackend, StoreParams,
    TransactionMode, UpgradeCallback, VersionChangeEvent, VersionChangeHandler,
};
use crate::error::{StorageError, StorageResult};
use crate::key_path::KeyPath;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) use store::ObjectStore;
use transaction::MemoryTransaction;

/// An in-memory host store.
///
/// This backend keeps every database in memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral databases that don't need persistence
///
/// It behaves like a browser-style versioned store: upgrades run
/// exclusively and commit atomically with the version bump, open
/// connections are told about version changes and deletions, and
/// read/write transactions are serialized at commit.
///
/// # Thread Safety
///
/// The backend is `Send + Sync`; clones share the same databases.
///
/// # Example
///
/// ```rust
/// use stratadb_storage::{MemoryBackend, StoreBackend, StoreParams, TransactionMode, Value};
///
/// let backend = MemoryBackend::new();
/// let conn = backend
///     .open("app", 1, &mut |editor| editor.create_store("notes", StoreParams::auto_increment()))
///     .unwrap();
///
/// let mut tx = conn.transaction(&["notes"], TransactionMode::ReadWrite).unwrap();
/// let key = tx.add("notes", Value::from("hello"), None).unwrap();
/// tx.commit().unwrap();
///
/// let tx = conn.transaction(&["notes"], TransactionMode::ReadOnly).unwrap();
/// assert_eq!(tx.get("notes", &key).unwrap(), Some(Value::from("hello")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Debug, Default)]
struct Registry {
    databases: HashMap<String, Arc<DatabaseCell>>,
}

/// One database and the connections open against it.
pub(crate) struct DatabaseCell {
    name: String,
    pub(crate) state: RwLock<DatabaseState>,
    connections: Mutex<Vec<Arc<ConnectionShared>>>,
    next_generation: AtomicU64,
    deleted: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, ObjectStore>,
}

struct ConnectionShared {
    closed: AtomicBool,
    opened_version: u64,
    handler: Mutex<Option<Arc<dyn Fn(&VersionChangeEvent) + Send + Sync>>>,
}

impl std::fmt::Debug for DatabaseCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCell")
            .field("name", &self.name)
            .field("version", &self.state.read().version)
            .field("deleted", &self.deleted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DatabaseCell {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(DatabaseState::default()),
            connections: Mutex::new(Vec::new()),
            next_generation: AtomicU64::new(1),
            deleted: AtomicBool::new(false),
        }
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Sends `new_version` to every open connection and returns how many
    /// stayed open. Handlers run without any lock held so they may close
    /// their connection.
    fn notify_version_change(&self, new_version: Option<u64>) -> usize {
        let open: Vec<Arc<ConnectionShared>> = self
            .connections
            .lock()
            .iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .cloned()
            .collect();

        for conn in &open {
            let handler = conn.handler.lock().clone();
            if let Some(handler) = handler {
                handler(&VersionChangeEvent {
                    old_version: conn.opened_version,
                    new_version,
                });
            }
        }

        open.iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .count()
    }

    fn release(&self, conn: &Arc<ConnectionShared>) {
        self.connections.lock().retain(|c| !Arc::ptr_eq(c, conn));
    }
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of open connections to `name`.
    #[must_use]
    pub fn open_connections(&self, name: &str) -> usize {
        self.registry
            .lock()
            .databases
            .get(name)
            .map_or(0, |cell| cell.connections.lock().len())
    }

    /// Returns the store names of `name`, sorted.
    #[must_use]
    pub fn store_names(&self, name: &str) -> Vec<String> {
        self.cell(name)
            .map(|cell| cell.state.read().stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the index names of a store, sorted.
    #[must_use]
    pub fn index_names(&self, name: &str, store: &str) -> Vec<String> {
        self.cell(name)
            .and_then(|cell| cell.state.read().stores.get(store).map(ObjectStore::index_names))
            .unwrap_or_default()
    }

    fn cell(&self, name: &str) -> Option<Arc<DatabaseCell>> {
        self.registry.lock().databases.get(name).cloned()
    }

    fn run_upgrade(
        &self,
        cell: &Arc<DatabaseCell>,
        version: u64,
        upgrade: &mut UpgradeCallback<'_>,
    ) -> StorageResult<()> {
        let old_version = cell.state.read().version;

        let still_open = cell.notify_version_change(Some(version));
        if still_open > 0 {
            return Err(StorageError::Blocked {
                name: cell.name.clone(),
                open_connections: still_open,
            });
        }

        // The callback works on a staging copy that replaces the live state
        // only when it succeeds. The write lock is held throughout so no
        // commit lands between the copy and the swap.
        let mut live = cell.state.write();
        let mut staging = live.clone();
        {
            let mut editor = MemorySchemaEditor {
                cell,
                state: &mut staging,
                old_version,
                new_version: version,
            };
            upgrade(&mut editor)?;
        }
        staging.version = version;
        *live = staging;
        drop(live);

        info!(db = %cell.name, old_version, new_version = version, "database upgraded");
        Ok(())
    }
}

impl StoreBackend for MemoryBackend {
    fn open(
        &self,
        name: &str,
        version: u64,
        upgrade: &mut UpgradeCallback<'_>,
    ) -> StorageResult<Arc<dyn BackendConnection>> {
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }

        let (cell, is_new) = {
            let mut registry = self.registry.lock();
            match registry.databases.get(name) {
                Some(cell) => (Arc::clone(cell), false),
                None => {
                    let cell = Arc::new(DatabaseCell::new(name));
                    registry
                        .databases
                        .insert(name.to_string(), Arc::clone(&cell));
                    (cell, true)
                }
            }
        };

        let stored = cell.state.read().version;
        if version < stored {
            return Err(StorageError::VersionError {
                requested: version,
                stored,
            });
        }

        if version > stored {
            if let Err(err) = self.run_upgrade(&cell, version, upgrade) {
                if is_new {
                    // A database whose first upgrade failed never existed.
                    let mut registry = self.registry.lock();
                    if registry
                        .databases
                        .get(name)
                        .is_some_and(|c| Arc::ptr_eq(c, &cell))
                    {
                        registry.databases.remove(name);
                    }
                }
                debug!(db = name, version, error = %err, "open failed during upgrade");
                return Err(err);
            }
        }

        let shared = Arc::new(ConnectionShared {
            closed: AtomicBool::new(false),
            opened_version: version,
            handler: Mutex::new(None),
        });
        cell.connections.lock().push(Arc::clone(&shared));
        debug!(db = name, version, "connection opened");

        Ok(Arc::new(MemoryConnection {
            name: name.to_string(),
            version,
            cell,
            shared,
        }))
    }

    fn delete_database(&self, name: &str) -> StorageResult<()> {
        let Some(cell) = self.cell(name) else {
            return Ok(());
        };

        let still_open = cell.notify_version_change(None);
        if still_open > 0 {
            return Err(StorageError::Blocked {
                name: name.to_string(),
                open_connections: still_open,
            });
        }

        let mut registry = self.registry.lock();
        if registry
            .databases
            .get(name)
            .is_some_and(|c| Arc::ptr_eq(c, &cell))
        {
            registry.databases.remove(name);
        }
        cell.deleted.store(true, Ordering::SeqCst);
        info!(db = name, "database deleted");
        Ok(())
    }

    fn database_version(&self, name: &str) -> Option<u64> {
        self.cell(name).map(|cell| cell.state.read().version)
    }

    fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().databases.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A connection to a database held by [`MemoryBackend`].
pub struct MemoryConnection {
    name: String,
    version: u64,
    cell: Arc<DatabaseCell>,
    shared: Arc<ConnectionShared>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BackendConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.cell.state.read().stores.keys().cloned().collect()
    }

    fn transaction(
        &self,
        scope: &[&str],
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn BackendTransaction>> {
        if self.is_closed() || self.cell.is_deleted() {
            return Err(StorageError::Closed);
        }
        if scope.is_empty() {
            return Err(StorageError::invalid_access(
                "transaction scope must name at least one store",
            ));
        }

        let state = self.cell.state.read();
        let version = state.version;
        let mut stores = BTreeMap::new();
        for name in scope {
            let store = state
                .stores
                .get(*name)
                .ok_or_else(|| StorageError::not_found(format!("object store {name}")))?;
            stores.insert((*name).to_string(), store.clone());
        }
        drop(state);

        Ok(Box::new(MemoryTransaction::new(
            Arc::clone(&self.cell),
            version,
            mode,
            stores,
        )))
    }

    fn set_version_change_handler(&self, handler: VersionChangeHandler) {
        *self.shared.handler.lock() = Some(Arc::from(handler));
    }

    fn close(&self) -> StorageResult<()> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            self.cell.release(&self.shared);
            debug!(db = %self.name, "connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct MemorySchemaEditor<'a> {
    cell: &'a DatabaseCell,
    state: &'a mut DatabaseState,
    old_version: u64,
    new_version: u64,
}

impl SchemaEditor for MemorySchemaEditor<'_> {
    fn old_version(&self) -> u64 {
        self.old_version
    }

    fn new_version(&self) -> u64 {
        self.new_version
    }

    fn store_names(&self) -> Vec<String> {
        self.state.stores.keys().cloned().collect()
    }

    fn contains_store(&self, name: &str) -> bool {
        self.state.stores.contains_key(name)
    }

    fn create_store(&mut self, name: &str, params: StoreParams) -> StorageResult<()> {
        if self.state.stores.contains_key(name) {
            return Err(StorageError::constraint(format!(
                "object store {name} already exists"
            )));
        }
        if params.auto_increment {
            match &params.key_path {
                Some(KeyPath::Compound(_)) => {
                    return Err(StorageError::invalid_access(
                        "a key generator cannot be combined with a compound key path",
                    ));
                }
                Some(KeyPath::Single(path)) if path.is_empty() => {
                    return Err(StorageError::invalid_access(
                        "a key generator cannot be combined with the empty key path",
                    ));
                }
                _ => {}
            }
        }
        let store = ObjectStore::new(params, self.cell.next_generation());
        self.state.stores.insert(name.to_string(), store);
        Ok(())
    }

    fn delete_store(&mut self, name: &str) -> StorageResult<()> {
        self.state
            .stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("object store {name}")))
    }

    fn create_index(&mut self, store: &str, params: IndexParams) -> StorageResult<()> {
        if params.multi_entry && matches!(params.key_path, KeyPath::Compound(_)) {
            return Err(StorageError::invalid_access(
                "a multi-entry index cannot use a compound key path",
            ));
        }
        self.state
            .stores
            .get_mut(store)
            .ok_or_else(|| StorageError::not_found(format!("object store {store}")))?
            .create_index(store, params)
    }

    fn index_names(&self, store: &str) -> StorageResult<Vec<String>> {
        self.state
            .stores
            .get(store)
            .map(ObjectStore::index_names)
            .ok_or_else(|| StorageError::not_found(format!("object store {store}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::value::Value;

    fn create_users(editor: &mut dyn SchemaEditor) -> StorageResult<()> {
        editor.create_store("users", StoreParams::key_path("id"))?;
        editor.create_index("users", IndexParams::new("email", "email").unique(true))
    }

    fn no_upgrade(_: &mut dyn SchemaEditor) -> StorageResult<()> {
        panic!("upgrade must not run");
    }

    #[test]
    fn open_new_database_runs_upgrade() {
        let backend = MemoryBackend::new();
        let conn = backend.open("app", 1, &mut create_users).unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.store_names(), vec!["users".to_string()]);
        assert_eq!(backend.database_version("app"), Some(1));
        assert_eq!(backend.index_names("app", "users"), vec!["email".to_string()]);
    }

    #[test]
    fn reopen_same_version_skips_upgrade() {
        let backend = MemoryBackend::new();
        backend.open("app", 1, &mut create_users).unwrap().close().unwrap();
        let conn = backend.open("app", 1, &mut no_upgrade).unwrap();
        assert_eq!(conn.version(), 1);
    }

    #[test]
    fn version_zero_rejected() {
        let backend = MemoryBackend::new();
        let err = backend.open("app", 0, &mut no_upgrade).err().unwrap();
        assert_eq!(err, StorageError::InvalidVersion(0));
    }

    #[test]
    fn lower_version_rejected() {
        let backend = MemoryBackend::new();
        backend.open("app", 2, &mut create_users).unwrap().close().unwrap();
        let err = backend.open("app", 1, &mut no_upgrade).err().unwrap();
        assert!(matches!(err, StorageError::VersionError { requested: 1, stored: 2 }));
    }

    #[test]
    fn failed_upgrade_leaves_no_trace() {
        let backend = MemoryBackend::new();
        let err = backend
            .open("app", 1, &mut |editor| {
                editor.create_store("users", StoreParams::key_path("id"))?;
                Err(StorageError::upgrade_aborted("boom"))
            })
            .err().unwrap();
        assert!(matches!(err, StorageError::UpgradeAborted { .. }));
        assert_eq!(backend.database_version("app"), None);
        assert!(backend.database_names().is_empty());
    }

    #[test]
    fn failed_upgrade_keeps_previous_schema() {
        let backend = MemoryBackend::new();
        backend.open("app", 1, &mut create_users).unwrap().close().unwrap();
        let result = backend.open("app", 2, &mut |editor| {
            editor.delete_store("users")?;
            editor.create_store("users", StoreParams::key_path("id"))
                .and(Err(StorageError::upgrade_aborted("boom")))
        });
        assert!(result.is_err());
        assert_eq!(backend.database_version("app"), Some(1));
        assert_eq!(backend.index_names("app", "users"), vec!["email".to_string()]);
    }

    #[test]
    fn upgrade_blocked_by_open_connection() {
        let backend = MemoryBackend::new();
        let _first = backend.open("app", 1, &mut create_users).unwrap();
        let err = backend
            .open("app", 2, &mut |_| Ok(()))
            .err().unwrap();
        assert!(matches!(err, StorageError::Blocked { open_connections: 1, .. }));
        assert_eq!(backend.database_version("app"), Some(1));
    }

    #[test]
    fn delete_notifies_and_unblocks_when_handler_closes() {
        let backend = MemoryBackend::new();
        let conn = backend.open("app", 1, &mut create_users).unwrap();
        let weak = Arc::downgrade(&conn);
        conn.set_version_change_handler(Box::new(move |event| {
            assert!(event.is_deletion());
            if let Some(conn) = weak.upgrade() {
                conn.close().unwrap();
            }
        }));

        backend.delete_database("app").unwrap();
        assert!(conn.is_closed());
        assert_eq!(backend.database_version("app"), None);
        assert!(matches!(
            conn.transaction(&["users"], TransactionMode::ReadOnly),
            Err(StorageError::Closed)
        ));
    }

    #[test]
    fn delete_blocked_without_handler() {
        let backend = MemoryBackend::new();
        let _conn = backend.open("app", 1, &mut create_users).unwrap();
        let err = backend.delete_database("app").unwrap_err();
        assert!(matches!(err, StorageError::Blocked { .. }));
    }

    #[test]
    fn delete_missing_database_is_ok() {
        assert!(MemoryBackend::new().delete_database("nothing").is_ok());
    }

    #[test]
    fn close_is_idempotent() {
        let backend = MemoryBackend::new();
        let conn = backend.open("app", 1, &mut create_users).unwrap();
        conn.close().unwrap();
        conn.close().unwrap();
        assert_eq!(backend.open_connections("app"), 0);
    }

    #[test]
    fn transaction_scope_checks() {
        let backend = MemoryBackend::new();
        let conn = backend.open("app", 1, &mut create_users).unwrap();
        assert!(matches!(
            conn.transaction(&[], TransactionMode::ReadOnly),
            Err(StorageError::InvalidAccess { .. })
        ));
        assert!(matches!(
            conn.transaction(&["nope"], TransactionMode::ReadOnly),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn create_store_twice_is_constraint_error() {
        let backend = MemoryBackend::new();
        let err = backend
            .open("app", 1, &mut |editor| {
                editor.create_store("a", StoreParams::auto_increment())?;
                editor.create_store("a", StoreParams::auto_increment())
            })
            .err().unwrap();
        assert!(err.is_constraint());
    }

    #[test]
    fn upgrade_sees_versions() {
        let backend = MemoryBackend::new();
        backend.open("app", 1, &mut create_users).unwrap().close().unwrap();
        backend
            .open("app", 3, &mut |editor| {
                assert_eq!(editor.old_version(), 1);
                assert_eq!(editor.new_version(), 3);
                assert!(editor.contains_store("users"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn upgrade_fails_pending_commit_from_older_version() {
        let backend = MemoryBackend::new();
        let conn = backend.open("app", 1, &mut create_users).unwrap();
        let mut tx = conn.transaction(&["users"], TransactionMode::ReadWrite).unwrap();
        tx.put(
            "users",
            Value::map([("id", Value::from(1)), ("email", Value::from("a@x.com"))]),
            None,
        )
        .unwrap();
        conn.close().unwrap();

        let conn = backend
            .open("app", 2, &mut |editor| {
                editor.delete_store("users")?;
                editor.create_store("users", StoreParams::key_path("email"))
            })
            .unwrap();
        assert_eq!(tx.commit().unwrap_err(), StorageError::Closed);

        let tx = conn.transaction(&["users"], TransactionMode::ReadOnly).unwrap();
        assert_eq!(tx.count("users", None).unwrap(), 0);
        assert!(backend.index_names("app", "users").is_empty());
    }

    #[test]
    fn committed_data_survives_reopen() {
        let backend = MemoryBackend::new();
        let conn = backend.open("app", 1, &mut create_users).unwrap();
        let mut tx = conn.transaction(&["users"], TransactionMode::ReadWrite).unwrap();
        tx.put(
            "users",
            Value::map([("id", Value::from(1)), ("email", Value::from("a@x.com"))]),
            None,
        )
        .unwrap();
        tx.commit().unwrap();
        conn.close().unwrap();

        let conn = backend.open("app", 1, &mut no_upgrade).unwrap();
        let tx = conn.transaction(&["users"], TransactionMode::ReadOnly).unwrap();
        assert!(tx.get("users", &Key::from(1)).unwrap().is_some());
    }
}
