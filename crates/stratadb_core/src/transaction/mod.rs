//! Transaction coordination.
//!
//! StrataDB transactions are scoped to a fixed set of collections and
//! settle exactly once:
//! - **Committed**: every write became visible at once
//! - **Aborted**: explicitly, by close, or by dropping the handle
//! - **Failed**: the host rejected a request or the commit
//!
//! Isolation and serialization are the host's job; the coordinator only
//! tracks the live transaction and its terminal outcome.

mod collection;
mod handle;
mod state;

pub use collection::{Collection, IndexHandle};
pub use handle::Transaction;
pub(crate) use state::TxnShared;
pub use state::TransactionOutcome;
