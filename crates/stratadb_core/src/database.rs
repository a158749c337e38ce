//! Connection lifecycle and transaction coordination.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::migration::{MigrationEngine, MigrationReport};
use crate::schema::Schema;
use crate::transaction::{Transaction, TxnShared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use stratadb_storage::{
    BackendConnection, StorageError, StoreBackend, TransactionMode, VersionChangeEvent,
    VersionChangeHandler,
};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection is held.
    Closed,
    /// `open` is in progress.
    Opening,
    /// A connection is held and transactions may begin.
    Open,
}

struct Inner {
    state: ConnectionState,
    connection: Option<Arc<dyn BackendConnection>>,
    /// Most recently started transaction; it may have settled since.
    current: Option<Arc<TxnShared>>,
    last_migration: Option<MigrationReport>,
}

impl Inner {
    fn release(&mut self) -> (Option<Arc<dyn BackendConnection>>, Option<Arc<TxnShared>>) {
        self.state = ConnectionState::Closed;
        (self.connection.take(), self.current.take())
    }
}

/// The main database handle.
///
/// `Database` owns the connection to one named database of a host store.
/// It provides:
/// - Versioned open with schema migration
/// - Scoped transactions, one live at a time
/// - Graceful close, and forced close when the database is deleted
///   elsewhere
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use stratadb_core::{CollectionSchema, Database, FieldSchema, Schema, TransactionMode};
/// use stratadb_storage::{MemoryBackend, Value};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> stratadb_core::CoreResult<()> {
/// let schema = Schema::new("app", 1).collection(
///     CollectionSchema::new("users")
///         .primary_key("id")
///         .field(FieldSchema::searchable("email").unique()),
/// );
/// let db = Database::new(schema, Arc::new(MemoryBackend::new()))?;
/// assert!(db.open().await?);
///
/// let txn = db.begin(&["users"], TransactionMode::ReadWrite)?;
/// let users = txn.collection("users")?;
/// users.put(Value::map([("id", Value::from(1)), ("email", Value::from("a@x.com"))]))?;
/// txn.commit().await.into_result()?;
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Database {
    schema: Arc<Schema>,
    backend: Arc<dyn StoreBackend>,
    config: Config,
    inner: Arc<Mutex<Inner>>,
}

impl Database {
    /// Creates a closed database handle with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the schema fails validation.
    pub fn new(schema: Schema, backend: Arc<dyn StoreBackend>) -> CoreResult<Self> {
        Self::with_config(schema, backend, Config::default())
    }

    /// Creates a closed database handle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the schema fails validation.
    pub fn with_config(
        schema: Schema,
        backend: Arc<dyn StoreBackend>,
        config: Config,
    ) -> CoreResult<Self> {
        schema.validate()?;
        Ok(Self {
            schema: Arc::new(schema),
            backend,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Closed,
                connection: None,
                current: None,
                last_migration: None,
            })),
        })
    }

    /// Opens the connection at the schema's version.
    ///
    /// If the stored version is older, the schema is migrated before the
    /// open completes. Returns true when the migration created or replaced
    /// at least one collection.
    ///
    /// # Errors
    ///
    /// - `AlreadyOpen` while open or opening
    /// - `Migration` if a collection or index operation failed; the host
    ///   discards the whole upgrade
    /// - `Open` if the host refused the open, e.g. because another
    ///   connection blocks the upgrade
    pub async fn open(&self) -> CoreResult<bool> {
        let name = self.schema.name.as_str();
        let version = self.schema.version;
        {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Closed {
                return Err(CoreError::AlreadyOpen {
                    name: name.to_string(),
                });
            }
            inner.state = ConnectionState::Opening;
        }
        debug!(db = %name, version, "opening database");

        let mut report = None;
        let mut migration_error = None;
        let opened = self.backend.open(name, version, &mut |editor| {
            match MigrationEngine::apply(&self.schema, editor) {
                Ok(applied) => {
                    report = Some(applied);
                    Ok(())
                }
                Err(err) => {
                    let reason = err.to_string();
                    migration_error = Some(err);
                    Err(StorageError::upgrade_aborted(reason))
                }
            }
        });

        let connection = match opened {
            Ok(connection) => connection,
            Err(source) => {
                self.inner.lock().state = ConnectionState::Closed;
                if let Some(err) = migration_error {
                    warn!(db = %name, version, error = %err, "migration failed");
                    return Err(err);
                }
                warn!(db = %name, version, error = %source, "open failed");
                return Err(CoreError::Open {
                    name: name.to_string(),
                    source,
                });
            }
        };

        let created = report.as_ref().is_some_and(MigrationReport::created);
        {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Open;
            inner.connection = Some(Arc::clone(&connection));
            if report.is_some() {
                inner.last_migration = report;
            }
        }
        connection.set_version_change_handler(version_change_handler(
            Arc::downgrade(&self.inner),
            name.to_string(),
        ));

        info!(db = %name, version, created, "database open");
        Ok(created)
    }

    /// Closes the connection.
    ///
    /// A live transaction is aborted first unless the configuration says
    /// otherwise. Resolves after the configured grace delay. Closing a
    /// closed database succeeds immediately.
    ///
    /// # Errors
    ///
    /// `Close` if the host failed to release the connection;
    /// `InvalidOperation` while an open is in progress.
    pub async fn close(&self) -> CoreResult<()> {
        let name = &self.schema.name;
        let (connection, current) = {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Closed => return Ok(()),
                ConnectionState::Opening => {
                    return Err(CoreError::invalid_operation(
                        "cannot close while open is in progress",
                    ));
                }
                ConnectionState::Open => inner.release(),
            }
        };

        if let Some(current) = current {
            if self.config.abort_on_close && current.abort() {
                warn!(db = %name, "live transaction aborted by close");
            }
        }
        if let Some(connection) = connection {
            connection.close().map_err(|source| CoreError::Close {
                name: name.clone(),
                source,
            })?;
        }

        tokio::time::sleep(self.config.close_grace).await;
        info!(db = %name, "database closed");
        Ok(())
    }

    /// Closes the connection and deletes the database from the host.
    ///
    /// # Errors
    ///
    /// `Close` if closing failed or another connection blocks the deletion.
    pub async fn drop_database(&self) -> CoreResult<()> {
        self.close().await?;
        self.backend
            .delete_database(&self.schema.name)
            .map_err(|source| CoreError::Close {
                name: self.schema.name.clone(),
                source,
            })?;
        self.inner.lock().last_migration = None;
        info!(db = %self.schema.name, "database deleted");
        Ok(())
    }

    /// Begins a transaction over `collections`.
    ///
    /// # Errors
    ///
    /// - `NotOpen` unless the database is open
    /// - `UnknownCollection` for a name the schema does not declare
    /// - `TransactionInProgress` while an earlier transaction is unsettled
    /// - `InvalidOperation` for an empty scope
    /// - `Transaction` if the host refused the transaction
    pub fn begin(&self, collections: &[&str], mode: TransactionMode) -> CoreResult<Transaction> {
        let name = &self.schema.name;
        let mut inner = self.inner.lock();
        let connection = match (inner.state, &inner.connection) {
            (ConnectionState::Open, Some(connection)) => Arc::clone(connection),
            _ => return Err(CoreError::not_open(name.as_str())),
        };
        if collections.is_empty() {
            return Err(CoreError::invalid_operation("transaction scope is empty"));
        }
        if let Some(unknown) = collections.iter().find(|c| !self.schema.contains(c)) {
            return Err(CoreError::unknown_collection(*unknown));
        }
        if inner.current.as_ref().is_some_and(|t| !t.is_settled()) {
            return Err(CoreError::TransactionInProgress { name: name.clone() });
        }

        let backend = connection
            .transaction(collections, mode)
            .map_err(|source| CoreError::Transaction { source })?;
        let scope = backend.scope().to_vec();
        let shared = Arc::new(TxnShared::new(name.clone(), backend));
        inner.current = Some(Arc::clone(&shared));
        debug!(db = %name, ?scope, %mode, "transaction started");

        Ok(Transaction::new(shared, Arc::clone(&self.schema), scope, mode))
    }

    /// Aborts the live transaction, if any.
    pub fn abort(&self) {
        let current = self.inner.lock().current.clone();
        if let Some(current) = current {
            current.abort();
        }
    }

    /// Returns true while a transaction is unsettled.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.inner
            .lock()
            .current
            .as_ref()
            .is_some_and(|t| !t.is_settled())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns true while open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// The schema this handle was created with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Report of the last migration run by this handle.
    #[must_use]
    pub fn last_migration(&self) -> Option<MigrationReport> {
        self.inner.lock().last_migration.clone()
    }

    /// Collection names present in the host while open.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map(|c| c.store_names())
            .unwrap_or_default()
    }
}

/// Closes the connection when the host announces a deletion, so the
/// deletion is not blocked by this handle. Other version changes are left
/// to the requesting party.
fn version_change_handler(inner: Weak<Mutex<Inner>>, name: String) -> VersionChangeHandler {
    Box::new(move |event: &VersionChangeEvent| {
        if !event.is_deletion() {
            debug!(db = %name, ?event, "ignoring version change");
            return;
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let (connection, current) = inner.lock().release();
        if let Some(current) = current {
            if current.abort() {
                warn!(db = %name, "live transaction aborted by deletion");
            }
        }
        if let Some(connection) = connection {
            if let Err(err) = connection.close() {
                warn!(db = %name, error = %err, "forced close failed");
            }
            info!(db = %name, "database deleted elsewhere, connection closed");
        }
    })
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.schema.name)
            .field("version", &self.schema.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let (connection, current) = self.inner.lock().release();
        if let Some(current) = current {
            current.abort();
        }
        if let Some(connection) = connection {
            let _ = connection.close();
        }
    }
}
