//! Transaction state.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use stratadb_storage::{BackendTransaction, StorageError, StorageResult};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Terminal outcome of a transaction.
///
/// A transaction settles exactly once. Commit and abort are kept apart so
/// callers never have to track which one happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Every write was committed by the host.
    Committed,
    /// The transaction was aborted and nothing was written.
    Aborted,
    /// The host reported a failure; nothing was written.
    Failed(StorageError),
}

impl TransactionOutcome {
    /// Returns true for [`TransactionOutcome::Committed`].
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Returns true for [`TransactionOutcome::Aborted`].
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&StorageError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Converts the outcome into a result. Abort is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` for a failed outcome.
    pub fn into_result(self) -> CoreResult<()> {
        match self {
            Self::Committed | Self::Aborted => Ok(()),
            Self::Failed(source) => Err(CoreError::Transaction { source }),
        }
    }
}

struct TxnInner {
    /// Host transaction; `None` once settled.
    backend: Option<Box<dyn BackendTransaction>>,
    outcome: Option<TransactionOutcome>,
}

/// State shared by a transaction handle and the coordinator slot.
pub(crate) struct TxnShared {
    db: String,
    inner: Mutex<TxnInner>,
    settled: Notify,
}

impl TxnShared {
    pub(crate) fn new(db: String, backend: Box<dyn BackendTransaction>) -> Self {
        Self {
            db,
            inner: Mutex::new(TxnInner {
                backend: Some(backend),
                outcome: None,
            }),
            settled: Notify::new(),
        }
    }

    pub(crate) fn outcome(&self) -> Option<TransactionOutcome> {
        self.inner.lock().outcome.clone()
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    /// Runs one request against the host transaction.
    ///
    /// A failing request settles the transaction as failed.
    pub(crate) fn run<T>(
        &self,
        request: impl FnOnce(&mut dyn BackendTransaction) -> StorageResult<T>,
    ) -> CoreResult<T> {
        let mut inner = self.inner.lock();
        let Some(backend) = inner.backend.as_mut() else {
            return Err(CoreError::Transaction {
                source: StorageError::TransactionInactive,
            });
        };
        match request(backend.as_mut()) {
            Ok(value) => Ok(value),
            Err(source) => {
                if let Some(backend) = inner.backend.take() {
                    backend.abort();
                }
                warn!(db = %self.db, error = %source, "transaction failed");
                self.settle(&mut inner, TransactionOutcome::Failed(source.clone()));
                Err(CoreError::Transaction { source })
            }
        }
    }

    pub(crate) fn commit(&self) -> TransactionOutcome {
        let mut inner = self.inner.lock();
        if let Some(outcome) = &inner.outcome {
            return outcome.clone();
        }
        let outcome = match inner.backend.take() {
            Some(backend) => match backend.commit() {
                Ok(()) => TransactionOutcome::Committed,
                Err(err) => {
                    warn!(db = %self.db, error = %err, "commit failed");
                    TransactionOutcome::Failed(err)
                }
            },
            None => TransactionOutcome::Aborted,
        };
        debug!(db = %self.db, ?outcome, "transaction settled");
        self.settle(&mut inner, outcome.clone());
        outcome
    }

    /// Aborts the transaction. Returns false if it had already settled.
    pub(crate) fn abort(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            return false;
        }
        if let Some(backend) = inner.backend.take() {
            backend.abort();
        }
        debug!(db = %self.db, "transaction aborted");
        self.settle(&mut inner, TransactionOutcome::Aborted);
        true
    }

    /// Waits until the transaction settles.
    pub(crate) async fn wait(&self) -> TransactionOutcome {
        loop {
            let notified = self.settled.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn settle(&self, inner: &mut TxnInner, outcome: TransactionOutcome) {
        if inner.outcome.is_none() {
            inner.outcome = Some(outcome);
            self.settled.notify_waiters();
        }
    }
}

impl std::fmt::Debug for TxnShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnShared")
            .field("db", &self.db)
            .field("outcome", &self.inner.lock().outcome)
            .finish_non_exhaustive()
    }
}
