//! # StrataDB Testkit
//!
//! Test utilities for StrataDB.
//!
//! This crate provides:
//! - Sample schemas and in-memory database fixtures
//! - Property-based test generators using proptest
//! - One-shot test logging setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stratadb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_database() {
//!     let db = TestDatabase::open(users_schema(1)).await;
//!     let txn = db.begin(&["users"], TransactionMode::ReadWrite).unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use stratadb_core::TransactionMode;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
