//! Schema descriptors.
//!
//! A [`Schema`] declares everything the database should contain at one
//! version: its collections, their primary keys and which fields are
//! indexed. Descriptors are created by the caller before open and never
//! mutated by the core.
//!
//! Descriptors deserialize from JSON with camelCase field names:
//!
//! ```rust
//! use stratadb_core::Schema;
//!
//! let schema = Schema::from_json(r#"{
//!     "name": "app",
//!     "version": 1,
//!     "collections": [{
//!         "name": "users",
//!         "primaryKey": "id",
//!         "fields": [{ "name": "email", "searchable": true, "unique": true }]
//!     }]
//! }"#).unwrap();
//! assert_eq!(schema.collections[0].indexes().count(), 1);
//! ```

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use stratadb_storage::{IndexParams, KeyPath, StoreParams};

/// Description of a database at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Database name.
    pub name: String,
    /// Schema version. Starts at 1.
    pub version: u64,
    /// Collections in declaration order.
    #[serde(default)]
    pub collections: Vec<CollectionSchema>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
            collections: Vec::new(),
        }
    }

    /// Adds a collection.
    #[must_use]
    pub fn collection(mut self, collection: CollectionSchema) -> Self {
        self.collections.push(collection);
        self
    }

    /// Parses a schema from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` for malformed JSON or a schema that fails
    /// [`Schema::validate`].
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serializes the schema to JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if serialization fails.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Looks up a collection by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Returns true when the schema declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Checks structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` for an empty name, version 0, duplicate
    /// collection names, or duplicate indexed field names in one collection.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_schema("database name is empty"));
        }
        if self.version == 0 {
            return Err(CoreError::invalid_schema("version must be at least 1"));
        }

        let mut names = HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty() {
                return Err(CoreError::invalid_schema("collection name is empty"));
            }
            if !names.insert(collection.name.as_str()) {
                return Err(CoreError::invalid_schema(format!(
                    "collection {} is declared twice",
                    collection.name
                )));
            }
            let mut indexes = HashSet::new();
            for field in collection.indexes() {
                if !indexes.insert(field.name.as_str()) {
                    return Err(CoreError::invalid_schema(format!(
                        "field {} of collection {} is declared twice",
                        field.name, collection.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Desired lifecycle of a collection during an upgrade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionState {
    /// Create the collection if it does not exist yet.
    #[default]
    Create,
    /// Drop the collection if it exists, then create it again.
    Delete,
}

/// Description of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Collection name, unique within the schema.
    pub name: String,
    /// Key path of the primary key. `None` means generated keys.
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Lifecycle action.
    #[serde(default)]
    pub state: CollectionState,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    /// Creates a collection with generated keys and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            state: CollectionState::Create,
            fields: Vec::new(),
        }
    }

    /// Sets the primary key path.
    #[must_use]
    pub fn primary_key(mut self, path: impl Into<String>) -> Self {
        self.primary_key = Some(path.into());
        self
    }

    /// Sets the lifecycle state.
    #[must_use]
    pub fn state(mut self, state: CollectionState) -> Self {
        self.state = state;
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields that get an index.
    pub fn indexes(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.searchable)
    }

    /// Returns true when `name` is an indexed field.
    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes().any(|f| f.name == name)
    }

    /// Host key configuration for this collection.
    #[must_use]
    pub fn store_params(&self) -> StoreParams {
        match &self.primary_key {
            Some(path) => StoreParams::key_path(path.as_str()),
            None => StoreParams::auto_increment(),
        }
    }
}

/// Description of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field name; also the index name.
    pub name: String,
    /// Whether the field is indexed.
    #[serde(default)]
    pub searchable: bool,
    /// Whether index keys must be unique.
    #[serde(default)]
    pub unique: bool,
    /// Whether array values index each element.
    #[serde(default)]
    pub multi_entry: bool,
    /// Whether this field is the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
    /// Index key path. Defaults to the field name.
    #[serde(default)]
    pub key_path: Option<KeyPath>,
}

impl FieldSchema {
    /// Creates a plain, unindexed field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            searchable: false,
            unique: false,
            multi_entry: false,
            is_primary_key: false,
            key_path: None,
        }
    }

    /// Creates an indexed field.
    pub fn searchable(name: impl Into<String>) -> Self {
        Self {
            searchable: true,
            ..Self::new(name)
        }
    }

    /// Marks index keys unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Indexes each array element separately.
    #[must_use]
    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Sets an explicit index key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Host index configuration for this field.
    ///
    /// A primary key field's index is always unique.
    #[must_use]
    pub fn index_params(&self) -> IndexParams {
        let key_path = self
            .key_path
            .clone()
            .unwrap_or_else(|| KeyPath::single(self.name.as_str()));
        IndexParams::new(self.name.as_str(), key_path)
            .unique(self.is_primary_key || self.unique)
            .multi_entry(self.multi_entry)
    }
}
