//! Schema migration.
//!
//! Migrations in StrataDB are:
//! - **Declarative**: the engine reconciles a [`Schema`] against the host
//! - **Version-driven**: they only run inside the host's upgrade phase,
//!   when the requested version exceeds the stored one
//! - **Atomic**: the host commits every structural change together with
//!   the version bump, or none of them
//!
//! The engine never diffs existing indexes against the declaration. A
//! `Create` collection that already exists is left as it is; a `Delete`
//! collection is dropped and rebuilt from its descriptor.

use crate::error::{CoreError, CoreResult};
use crate::schema::{CollectionSchema, CollectionState, Schema};
use stratadb_storage::SchemaEditor;
use tracing::{debug, info};

/// An operation performed during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Created a new collection.
    CreateCollection {
        /// Name of the collection.
        name: String,
    },
    /// Dropped a collection.
    DropCollection {
        /// Name of the collection.
        name: String,
    },
    /// Created an index.
    CreateIndex {
        /// Collection the index is on.
        collection: String,
        /// Name of the index.
        index_name: String,
    },
}

/// Outcome of one upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version stored before the upgrade (0 for a new database).
    pub old_version: u64,
    /// Version after the upgrade.
    pub new_version: u64,
    /// Operations in execution order.
    pub operations: Vec<MigrationOperation>,
}

impl MigrationReport {
    /// Returns true when at least one collection was created or replaced.
    #[must_use]
    pub fn created(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, MigrationOperation::CreateCollection { .. }))
    }

    /// Names of the collections created by this upgrade, in order.
    #[must_use]
    pub fn created_collections(&self) -> Vec<&str> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                MigrationOperation::CreateCollection { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Applies schemas to the host during upgrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationEngine;

impl MigrationEngine {
    /// Reconciles `schema` against the stores visible through `editor`.
    ///
    /// Collections are processed strictly in declaration order. The first
    /// failure stops the migration; the caller must fail the upgrade so the
    /// host discards every change made so far.
    ///
    /// # Errors
    ///
    /// Returns `Migration` naming the collection whose operation failed.
    pub fn apply(schema: &Schema, editor: &mut dyn SchemaEditor) -> CoreResult<MigrationReport> {
        let mut report = MigrationReport {
            old_version: editor.old_version(),
            new_version: editor.new_version(),
            operations: Vec::new(),
        };

        for collection in &schema.collections {
            match collection.state {
                CollectionState::Create => {
                    if editor.contains_store(&collection.name) {
                        debug!(collection = %collection.name, "collection exists, keeping it");
                        continue;
                    }
                }
                CollectionState::Delete => {
                    if editor.contains_store(&collection.name) {
                        editor
                            .delete_store(&collection.name)
                            .map_err(|source| failed(collection, source))?;
                        debug!(collection = %collection.name, "dropped collection");
                        report.operations.push(MigrationOperation::DropCollection {
                            name: collection.name.clone(),
                        });
                    }
                }
            }
            Self::create(collection, editor, &mut report)?;
        }

        info!(
            db = %schema.name,
            from = report.old_version,
            to = report.new_version,
            operations = report.operations.len(),
            "migration applied"
        );
        Ok(report)
    }

    fn create(
        collection: &CollectionSchema,
        editor: &mut dyn SchemaEditor,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        editor
            .create_store(&collection.name, collection.store_params())
            .map_err(|source| failed(collection, source))?;
        debug!(collection = %collection.name, "created collection");
        report.operations.push(MigrationOperation::CreateCollection {
            name: collection.name.clone(),
        });

        for field in collection.indexes() {
            editor
                .create_index(&collection.name, field.index_params())
                .map_err(|source| failed(collection, source))?;
            debug!(collection = %collection.name, index = %field.name, "created index");
            report.operations.push(MigrationOperation::CreateIndex {
                collection: collection.name.clone(),
                index_name: field.name.clone(),
            });
        }
        Ok(())
    }
}

fn failed(collection: &CollectionSchema, source: stratadb_storage::StorageError) -> CoreError {
    CoreError::Migration {
        collection: collection.name.clone(),
        source,
    }
}
