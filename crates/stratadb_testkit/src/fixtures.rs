//! Test fixtures and database helpers.
//!
//! Provides sample schemas, record builders and in-memory databases for
//! common test scenarios.

use std::sync::Arc;
use std::time::Duration;
use stratadb_core::{
    CollectionSchema, Config, Database, FieldSchema, Schema, TransactionMode,
};
use stratadb_storage::{MemoryBackend, Value};

/// The schema from the end-to-end example, as JSON.
pub const APP_SCHEMA_JSON: &str = r#"{
    "name": "app",
    "version": 1,
    "collections": [
        {
            "name": "users",
            "primaryKey": "id",
            "fields": [
                { "name": "email", "searchable": true, "unique": true }
            ]
        }
    ]
}"#;

/// A `users` collection keyed by `id`, with a unique `email` index, an
/// `age` index and a multi-entry `tags` index.
pub fn users_collection() -> CollectionSchema {
    CollectionSchema::new("users")
        .primary_key("id")
        .field(FieldSchema::searchable("id").primary_key())
        .field(FieldSchema::searchable("email").unique())
        .field(FieldSchema::searchable("age"))
        .field(FieldSchema::searchable("tags").multi_entry())
        .field(FieldSchema::new("name"))
}

/// A `posts` collection with generated keys and an `author` index.
pub fn posts_collection() -> CollectionSchema {
    CollectionSchema::new("posts")
        .field(FieldSchema::searchable("author"))
        .field(FieldSchema::searchable("tags").multi_entry())
}

/// Schema named `app` holding only [`users_collection`].
pub fn users_schema(version: u64) -> Schema {
    Schema::new("app", version).collection(users_collection())
}

/// Schema named `app` holding users and posts.
pub fn blog_schema(version: u64) -> Schema {
    users_schema(version).collection(posts_collection())
}

/// Configuration without the close grace delay.
pub fn fast_config() -> Config {
    Config::new().close_grace(Duration::ZERO)
}

/// Builds a user record.
pub fn user(id: i64, email: &str) -> Value {
    Value::map([("id", Value::from(id)), ("email", Value::from(email))])
}

/// Builds a user record with age and tags.
pub fn user_with(id: i64, email: &str, age: i64, tags: &[&str]) -> Value {
    Value::map([
        ("id", Value::from(id)),
        ("email", Value::from(email)),
        ("age", Value::from(age)),
        (
            "tags",
            Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
        ),
    ])
}

/// Builds a post record.
pub fn post(author: i64, title: &str, tags: &[&str]) -> Value {
    Value::map([
        ("author", Value::from(author)),
        ("title", Value::from(title)),
        (
            "tags",
            Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
        ),
    ])
}

/// An open database on a private in-memory host.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The host, shared with any sibling handles.
    pub backend: Arc<MemoryBackend>,
}

impl TestDatabase {
    /// Opens `schema` on a fresh host.
    pub async fn open(schema: Schema) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let db = Database::with_config(schema, backend.clone(), fast_config())
            .expect("Failed to create database");
        db.open().await.expect("Failed to open database");
        Self { db, backend }
    }

    /// Creates another, closed handle on the same host.
    pub fn sibling(&self, schema: Schema) -> Database {
        Database::with_config(schema, self.backend.clone(), fast_config())
            .expect("Failed to create database")
    }

    /// Writes `records` to `collection` in one committed transaction.
    pub async fn seed(&self, collection: &str, records: impl IntoIterator<Item = Value>) {
        let txn = self
            .db
            .begin(&[collection], TransactionMode::ReadWrite)
            .expect("Failed to begin transaction");
        let handle = txn.collection(collection).expect("Collection not in scope");
        for record in records {
            handle.put(record).expect("Failed to write record");
        }
        txn.commit()
            .await
            .into_result()
            .expect("Failed to commit seed data");
    }

    /// Counts the records of `collection` in a read-only transaction.
    pub async fn count(&self, collection: &str) -> usize {
        let txn = self
            .db
            .begin(&[collection], TransactionMode::ReadOnly)
            .expect("Failed to begin transaction");
        let count = txn
            .collection(collection)
            .and_then(|c| c.count(None))
            .expect("Failed to count records");
        txn.commit().await;
        count
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}
