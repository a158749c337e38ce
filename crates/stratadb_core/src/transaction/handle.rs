//! Transaction handle.

use super::collection::Collection;
use super::state::{TransactionOutcome, TxnShared};
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use std::sync::Arc;
use stratadb_storage::TransactionMode;
use tracing::debug;

/// A transaction over a fixed set of collections.
///
/// Created by [`Database::begin`](crate::Database::begin). The transaction
/// settles exactly once, to one of the [`TransactionOutcome`]s:
/// - [`Transaction::commit`] commits every write made through its collections
/// - [`Transaction::abort`] discards them
/// - a request rejected by the host fails it
///
/// Dropping an unsettled transaction aborts it.
///
/// # Example
///
/// ```rust
/// # use std::sync::Arc;
/// # use stratadb_core::{CollectionSchema, Database, Schema, TransactionMode};
/// # use stratadb_storage::{MemoryBackend, Value};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> stratadb_core::CoreResult<()> {
/// # let schema = Schema::new("app", 1).collection(CollectionSchema::new("notes"));
/// # let db = Database::new(schema, Arc::new(MemoryBackend::new()))?;
/// # db.open().await?;
/// let txn = db.begin(&["notes"], TransactionMode::ReadWrite)?;
/// txn.collection("notes")?.add(Value::from("hello"))?;
/// assert!(txn.commit().await.is_committed());
/// # Ok(())
/// # }
/// ```
pub struct Transaction {
    shared: Arc<TxnShared>,
    schema: Arc<Schema>,
    scope: Vec<String>,
    mode: TransactionMode,
}

impl Transaction {
    pub(crate) fn new(
        shared: Arc<TxnShared>,
        schema: Arc<Schema>,
        scope: Vec<String>,
        mode: TransactionMode,
    ) -> Self {
        Self {
            shared,
            schema,
            scope,
            mode,
        }
    }

    /// Returns a handle to a collection in scope.
    ///
    /// # Errors
    ///
    /// `UnknownCollection` if `name` is outside the transaction's scope.
    pub fn collection(&self, name: &str) -> CoreResult<Collection<'_>> {
        if !self.scope.iter().any(|s| s == name) {
            return Err(CoreError::unknown_collection(name));
        }
        let schema = self
            .schema
            .get(name)
            .ok_or_else(|| CoreError::unknown_collection(name))?;
        Ok(Collection::new(&self.shared, schema))
    }

    /// Collections this transaction may touch, sorted by name.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns true until the transaction settles.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.shared.is_settled()
    }

    /// Returns the outcome once settled.
    #[must_use]
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        self.shared.outcome()
    }

    /// Aborts the transaction. No-op once settled.
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// Commits the transaction and returns its outcome.
    ///
    /// Committing a transaction that already settled returns the earlier
    /// outcome.
    pub async fn commit(self) -> TransactionOutcome {
        self.shared.commit()
    }

    /// Waits for the transaction to settle, however that happens.
    pub async fn done(&self) -> TransactionOutcome {
        self.shared.wait().await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.shared.abort() {
            debug!(scope = ?self.scope, "unsettled transaction dropped, aborted");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("scope", &self.scope)
            .field("mode", &self.mode)
            .field("outcome", &self.shared.outcome())
            .finish()
    }
}
