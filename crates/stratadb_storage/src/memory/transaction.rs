//! Transactions of the in-memory host.

use super::{DatabaseCell, ObjectStore};
use crate::backend::{BackendTransaction, TransactionMode};
use crate::error::{StorageError, StorageResult};
use crate::key::Key;
use crate::range::KeyRange;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A write accepted by a transaction, kept for replay at commit.
#[derive(Debug, Clone)]
enum WriteOp {
    Put {
        store: String,
        value: Value,
        key: Option<Key>,
        overwrite: bool,
    },
    Delete {
        store: String,
        range: KeyRange,
    },
    Clear {
        store: String,
    },
}

/// A transaction over a snapshot of its scope.
///
/// Reads and writes run against private copies of the scoped stores. On
/// commit the copies replace the live stores if nothing else committed to
/// them meanwhile; otherwise the write log is replayed on top of the live
/// stores so concurrent writers serialize at the host. A commit fails with
/// `Closed` once the database was upgraded past the version it began on.
pub(crate) struct MemoryTransaction {
    cell: Arc<DatabaseCell>,
    version: u64,
    mode: TransactionMode,
    scope: Vec<String>,
    stores: BTreeMap<String, ObjectStore>,
    log: Vec<WriteOp>,
}

impl MemoryTransaction {
    pub(crate) fn new(
        cell: Arc<DatabaseCell>,
        version: u64,
        mode: TransactionMode,
        stores: BTreeMap<String, ObjectStore>,
    ) -> Self {
        Self {
            cell,
            version,
            mode,
            scope: stores.keys().cloned().collect(),
            stores,
            log: Vec::new(),
        }
    }

    fn store(&self, name: &str) -> StorageResult<&ObjectStore> {
        self.stores
            .get(name)
            .ok_or_else(|| StorageError::not_found(format!("object store {name} in scope")))
    }

    fn store_mut(&mut self, name: &str) -> StorageResult<&mut ObjectStore> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(StorageError::ReadOnly);
        }
        self.stores
            .get_mut(name)
            .ok_or_else(|| StorageError::not_found(format!("object store {name} in scope")))
    }

    fn write(
        &mut self,
        store: &str,
        value: Value,
        key: Option<Key>,
        overwrite: bool,
    ) -> StorageResult<Key> {
        let target = self.store_mut(store)?;
        let mut value = value;
        let in_line = target.params().key_path.is_some();
        let primary = target.put(&mut value, key, overwrite)?;
        // Out-of-line keys are logged explicitly so replay never consults
        // the generator again.
        self.log.push(WriteOp::Put {
            store: store.to_string(),
            value,
            key: (!in_line).then(|| primary.clone()),
            overwrite,
        });
        Ok(primary)
    }
}

fn apply(stores: &mut BTreeMap<String, ObjectStore>, op: WriteOp) -> StorageResult<()> {
    let missing = |name: &str| StorageError::not_found(format!("object store {name}"));
    match op {
        WriteOp::Put {
            store,
            mut value,
            key,
            overwrite,
        } => {
            let target = stores.get_mut(&store).ok_or_else(|| missing(&store))?;
            target.put(&mut value, key, overwrite).map(|_| ())
        }
        WriteOp::Delete { store, range } => stores
            .get_mut(&store)
            .ok_or_else(|| missing(&store))?
            .delete(&range),
        WriteOp::Clear { store } => {
            stores.get_mut(&store).ok_or_else(|| missing(&store))?.clear();
            Ok(())
        }
    }
}

impl BackendTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn scope(&self) -> &[String] {
        &self.scope
    }

    fn get(&self, store: &str, key: &Key) -> StorageResult<Option<Value>> {
        self.store(store)?.get(key)
    }

    fn get_all(
        &self,
        store: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        self.store(store)?.get_all(range, limit)
    }

    fn get_all_keys(
        &self,
        store: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Key>> {
        Ok(self.store(store)?.keys(range, limit))
    }

    fn count(&self, store: &str, range: Option<&KeyRange>) -> StorageResult<usize> {
        Ok(self.store(store)?.count(range))
    }

    fn index_get_all(
        &self,
        store: &str,
        index: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        self.store(store)?.index_get_all(index, range, limit)
    }

    fn index_get_all_keys(
        &self,
        store: &str,
        index: &str,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Key>> {
        self.store(store)?.index_keys(index, range, limit)
    }

    fn index_count(
        &self,
        store: &str,
        index: &str,
        range: Option<&KeyRange>,
    ) -> StorageResult<usize> {
        self.store(store)?.index_count(index, range)
    }

    fn put(&mut self, store: &str, value: Value, key: Option<Key>) -> StorageResult<Key> {
        self.write(store, value, key, true)
    }

    fn add(&mut self, store: &str, value: Value, key: Option<Key>) -> StorageResult<Key> {
        self.write(store, value, key, false)
    }

    fn delete(&mut self, store: &str, range: &KeyRange) -> StorageResult<()> {
        self.store_mut(store)?.delete(range)?;
        self.log.push(WriteOp::Delete {
            store: store.to_string(),
            range: range.clone(),
        });
        Ok(())
    }

    fn clear(&mut self, store: &str) -> StorageResult<()> {
        self.store_mut(store)?.clear();
        self.log.push(WriteOp::Clear {
            store: store.to_string(),
        });
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        if this.log.is_empty() {
            return Ok(());
        }
        if this.cell.is_deleted() {
            return Err(StorageError::Closed);
        }

        let mut state = this.cell.state.write();
        if state.version != this.version {
            debug!(
                began = this.version,
                current = state.version,
                "transaction outlived an upgrade"
            );
            return Err(StorageError::Closed);
        }

        let mut unchanged = true;
        for (name, snapshot) in &this.stores {
            let live = state
                .stores
                .get(name)
                .ok_or_else(|| StorageError::not_found(format!("object store {name}")))?;
            if live.generation != snapshot.generation {
                unchanged = false;
            }
        }

        let committed = if unchanged {
            this.stores
        } else {
            debug!(ops = this.log.len(), "replaying transaction over newer state");
            let mut fresh: BTreeMap<String, ObjectStore> = this
                .scope
                .iter()
                .filter_map(|name| state.stores.get(name).map(|s| (name.clone(), s.clone())))
                .collect();
            for op in this.log {
                apply(&mut fresh, op)?;
            }
            fresh
        };

        for (name, mut store) in committed {
            store.generation = this.cell.next_generation();
            state.stores.insert(name, store);
        }
        Ok(())
    }

    fn abort(self: Box<Self>) {
        debug!(ops = self.log.len(), "transaction aborted");
    }
}
