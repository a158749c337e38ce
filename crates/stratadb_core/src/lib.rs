//! # StrataDB Core
//!
//! Transactional access to an embedded, versioned key-value host store.
//!
//! This crate provides:
//! - Schema descriptors for collections, primary keys and indexes
//! - A migration engine that reconciles a schema during version upgrades
//! - Connection lifecycle management with graceful and forced close
//! - Scoped transactions that settle exactly once
//! - A key-range builder for query predicates
//!
//! Durability, isolation and replication belong to the host store; see
//! `stratadb_storage` for the host traits and an in-memory host.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod key_range;
mod migration;
mod schema;
mod transaction;

pub use config::Config;
pub use database::{ConnectionState, Database};
pub use error::{CoreError, CoreResult};
pub use key_range::{build_range, QueryOp};
pub use migration::{MigrationEngine, MigrationOperation, MigrationReport};
pub use schema::{CollectionSchema, CollectionState, FieldSchema, Schema};
pub use stratadb_storage::{Key, KeyRange, TransactionMode, Value};
pub use transaction::{Collection, IndexHandle, Transaction, TransactionOutcome};
