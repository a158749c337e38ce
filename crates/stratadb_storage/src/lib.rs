//! # StrataDB Storage
//!
//! Host store traits and an in-memory host for StrataDB.
//!
//! A host is a versioned key-value store: named databases hold object
//! stores, each object store holds encoded records under ordered keys and
//! maintains secondary indexes. StrataDB's core never touches records
//! directly; it drives the host through the traits in this crate.
//!
//! ## Design Principles
//!
//! - Structure changes only inside an upgrade, and commits with the version
//! - Data access happens in transactions over a fixed scope of stores
//! - Open connections learn about version changes and deletions
//! - Hosts must be `Send + Sync`
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and ephemeral storage
//!
//! ## Example
//!
//! ```rust
//! use stratadb_storage::{IndexParams, Key, KeyRange, MemoryBackend, StoreBackend, StoreParams,
//!     TransactionMode, Value};
//!
//! let backend = MemoryBackend::new();
//! let conn = backend
//!     .open("app", 1, &mut |editor| {
//!         editor.create_store("users", StoreParams::key_path("id"))?;
//!         editor.create_index("users", IndexParams::new("age", "age"))
//!     })
//!     .unwrap();
//!
//! let mut tx = conn.transaction(&["users"], TransactionMode::ReadWrite).unwrap();
//! for (id, age) in [(1, 30), (2, 17), (3, 45)] {
//!     let user = Value::map([("id", Value::from(id)), ("age", Value::from(age))]);
//!     tx.put("users", user, None).unwrap();
//! }
//! tx.commit().unwrap();
//!
//! let tx = conn.transaction(&["users"], TransactionMode::ReadOnly).unwrap();
//! let adults = KeyRange::lower_bound(Key::from(18), false);
//! assert_eq!(tx.index_count("users", "age", Some(&adults)).unwrap(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod key;
mod key_path;
mod memory;
mod range;
mod value;

pub use backend::{
    BackendConnection, BackendTransaction, IndexParams, SchemaEditor, StoreBackend, StoreParams,
    TransactionMode, UpgradeCallback, VersionChangeEvent, VersionChangeHandler,
};
pub use error::{StorageError, StorageResult};
pub use key::Key;
pub use key_path::KeyPath;
pub use memory::{MemoryBackend, MemoryConnection};
pub use range::KeyRange;
pub use value::Value;
