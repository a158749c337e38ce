//! End-to-end scenarios against the in-memory host.

use std::sync::Arc;
use stratadb_core::{
    build_range, CollectionSchema, ConnectionState, CoreError, Database, FieldSchema, QueryOp,
    Schema, TransactionMode, TransactionOutcome, Value,
};
use stratadb_storage::{MemoryBackend, StorageError};
use stratadb_testkit::prelude::*;

#[tokio::test]
async fn users_email_uniqueness() {
    init_tracing();
    let schema = Schema::from_json(APP_SCHEMA_JSON).unwrap();
    let db = Database::with_config(schema, Arc::new(MemoryBackend::new()), fast_config()).unwrap();
    assert!(db.open().await.unwrap());

    let txn = db.begin(&["users"], TransactionMode::ReadWrite).unwrap();
    let users = txn.collection("users").unwrap();
    users.put(user(1, "a@x.com")).unwrap();
    assert_eq!(txn.commit().await, TransactionOutcome::Committed);

    let txn = db.begin(&["users"], TransactionMode::ReadWrite).unwrap();
    let err = txn
        .collection("users")
        .unwrap()
        .put(user(2, "a@x.com"))
        .unwrap_err();
    match &err {
        CoreError::Transaction { source } => assert!(source.is_constraint()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(txn.done().await, TransactionOutcome::Failed(_)));
    assert!(!txn.is_active());

    let txn = db.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    assert_eq!(txn.collection("users").unwrap().count(None).unwrap(), 1);
}

#[tokio::test]
async fn reopen_same_version_runs_no_migration() {
    let db = TestDatabase::open(users_schema(1)).await;
    db.seed("users", [user(1, "a@x.com")]).await;
    db.close().await.unwrap();

    let again = db.sibling(users_schema(1));
    assert!(!again.open().await.unwrap());
    assert!(again.last_migration().is_none());

    let txn = again.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    assert_eq!(txn.collection("users").unwrap().count(None).unwrap(), 1);
}

#[tokio::test]
async fn adding_a_collection_preserves_existing_ones() {
    let db = TestDatabase::open(users_schema(1)).await;
    db.seed("users", (1..=5).map(|i| user(i, &format!("{i}@x.com"))))
        .await;
    db.close().await.unwrap();

    let upgraded = db.sibling(blog_schema(2));
    assert!(upgraded.open().await.unwrap());
    let report = upgraded.last_migration().unwrap();
    assert_eq!(report.created_collections(), vec!["posts"]);
    assert_eq!(report.old_version, 1);
    assert_eq!(report.new_version, 2);

    let txn = upgraded
        .begin(&["users", "posts"], TransactionMode::ReadOnly)
        .unwrap();
    let users = txn.collection("users").unwrap();
    assert_eq!(users.count(None).unwrap(), 5);
    assert!(users
        .index("email")
        .unwrap()
        .get(&Value::from("3@x.com"))
        .unwrap()
        .is_some());
    assert_eq!(txn.collection("posts").unwrap().count(None).unwrap(), 0);
    assert_eq!(
        db.backend.index_names("app", "users"),
        vec!["age", "email", "id", "tags"]
    );
}

#[tokio::test]
async fn unknown_collection_leaves_connection_open() {
    let db = TestDatabase::open(users_schema(1)).await;
    let err = db.begin(&["users", "ghosts"], TransactionMode::ReadOnly);
    assert!(matches!(err, Err(CoreError::UnknownCollection { name }) if name == "ghosts"));
    assert_eq!(db.state(), ConnectionState::Open);

    let txn = db.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    assert!(matches!(
        txn.collection("posts"),
        Err(CoreError::UnknownCollection { .. })
    ));
}

#[tokio::test]
async fn range_queries_over_indexes() {
    let db = TestDatabase::open(users_schema(1)).await;
    db.seed(
        "users",
        [
            user_with(1, "a@x.com", 17, &["new"]),
            user_with(2, "b@x.com", 30, &["admin", "staff"]),
            user_with(3, "c@x.com", 45, &["staff"]),
            user_with(4, "d@x.com", 62, &[]),
        ],
    )
    .await;

    let txn = db.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    let users = txn.collection("users").unwrap();
    let age = users.index("age").unwrap();

    let adults = build_range(&Value::from(18), Some(QueryOp::GreaterThanEqualTo)).unwrap();
    assert_eq!(age.count(Some(&adults)).unwrap(), 3);

    let band = Value::map([("low", Value::from(30)), ("high", Value::from(45))]);
    let ids: Vec<_> = age
        .query(&band, Some(QueryOp::Between), None)
        .unwrap()
        .iter()
        .filter_map(|u| u.get("id").and_then(Value::as_integer))
        .collect();
    assert_eq!(ids, vec![2, 3]);

    let under_45 = build_range(&Value::from(45), Some(QueryOp::LessThan)).unwrap();
    assert_eq!(age.get_all_keys(Some(&under_45), None).unwrap().len(), 2);

    let staff = users.index("tags").unwrap();
    assert_eq!(staff.query(&Value::from("staff"), None, None).unwrap().len(), 2);

    let by_key = users
        .query(&Value::from(2), Some(QueryOp::GreaterThan))
        .unwrap();
    assert_eq!(by_key.len(), 2);

    assert!(matches!(
        users.index("name"),
        Err(CoreError::UnknownIndex { .. })
    ));
}

#[tokio::test]
async fn writes_and_deletes() {
    let db = TestDatabase::open(blog_schema(1)).await;

    let txn = db
        .begin(&["users", "posts"], TransactionMode::ReadWrite)
        .unwrap();
    let users = txn.collection("users").unwrap();
    let posts = txn.collection("posts").unwrap();
    users.add(user(1, "a@x.com")).unwrap();
    users.add(user(2, "b@x.com")).unwrap();
    let first = posts.add(post(1, "hello", &["intro"])).unwrap();
    let second = posts.add(post(2, "again", &[])).unwrap();
    assert!(first < second);

    users.delete_key(&Value::from(1)).unwrap();
    assert!(users.get(&Value::from(1)).unwrap().is_none());
    assert_eq!(
        posts.index("author").unwrap().count(None).unwrap(),
        2
    );
    posts.clear().unwrap();
    assert!(txn.commit().await.is_committed());

    assert_eq!(db.count("users").await, 1);
    assert_eq!(db.count("posts").await, 0);
}

#[tokio::test]
async fn explicit_keys_for_generated_key_collections() {
    let db = TestDatabase::open(blog_schema(1)).await;
    let txn = db.begin(&["posts"], TransactionMode::ReadWrite).unwrap();
    let posts = txn.collection("posts").unwrap();
    posts
        .put_with_key(post(1, "pinned", &[]), &Value::from("pinned"))
        .unwrap();
    posts
        .add_with_key(post(1, "draft", &[]), &Value::from("draft"))
        .unwrap();
    assert_eq!(posts.count(None).unwrap(), 2);
    assert!(matches!(
        posts.get(&Value::Null),
        Err(CoreError::InvalidKey { .. })
    ));
    // A rejected key never reaches the host, so the transaction is still live.
    assert!(txn.is_active());

    let err = posts
        .add_with_key(post(1, "again", &[]), &Value::from("draft"))
        .unwrap_err();
    assert!(matches!(
        err.storage_error(),
        Some(StorageError::ConstraintError { .. })
    ));
    assert!(!txn.is_active());
}

#[tokio::test]
async fn read_only_transaction_rejects_writes() {
    let db = TestDatabase::open(users_schema(1)).await;
    let txn = db.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    let err = txn
        .collection("users")
        .unwrap()
        .put(user(1, "a@x.com"))
        .unwrap_err();
    assert_eq!(err.storage_error(), Some(&StorageError::ReadOnly));
    assert_eq!(
        txn.outcome(),
        Some(TransactionOutcome::Failed(StorageError::ReadOnly))
    );
}

#[tokio::test]
async fn dropped_transaction_is_aborted() {
    let db = TestDatabase::open(users_schema(1)).await;
    {
        let txn = db.begin(&["users"], TransactionMode::ReadWrite).unwrap();
        txn.collection("users")
            .unwrap()
            .put(user(1, "a@x.com"))
            .unwrap();
    }
    assert!(!db.in_transaction());
    assert_eq!(db.count("users").await, 0);
}

#[tokio::test]
async fn done_resolves_for_waiters() {
    let db = TestDatabase::open(users_schema(1)).await;
    let txn = db.begin(&["users"], TransactionMode::ReadWrite).unwrap();
    let (outcome, ()) = tokio::join!(txn.done(), async {
        tokio::task::yield_now().await;
        db.abort();
    });
    assert_eq!(outcome, TransactionOutcome::Aborted);
}

#[tokio::test]
async fn close_without_abort_lets_transaction_finish() {
    let host = TestDatabase::open(users_schema(1)).await;
    let db = Database::with_config(
        users_schema(1),
        host.backend.clone(),
        fast_config().abort_on_close(false),
    )
    .unwrap();
    host.close().await.unwrap();
    db.open().await.unwrap();

    let txn = db.begin(&["users"], TransactionMode::ReadWrite).unwrap();
    txn.collection("users")
        .unwrap()
        .put(user(1, "a@x.com"))
        .unwrap();
    db.close().await.unwrap();
    assert!(txn.is_active());
    assert!(txn.commit().await.is_committed());

    db.open().await.unwrap();
    let txn = db.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    assert_eq!(txn.collection("users").unwrap().count(None).unwrap(), 1);
}

#[tokio::test]
async fn transaction_outliving_upgrade_cannot_commit() {
    let backend = Arc::new(MemoryBackend::new());
    let config = fast_config().abort_on_close(false);
    let v1 = Database::with_config(users_schema(1), backend.clone(), config.clone()).unwrap();
    v1.open().await.unwrap();

    let txn = v1.begin(&["users"], TransactionMode::ReadWrite).unwrap();
    txn.collection("users")
        .unwrap()
        .put(user(1, "old@x.com"))
        .unwrap();
    v1.close().await.unwrap();

    let replaced = Schema::new("app", 2).collection(
        CollectionSchema::new("users")
            .primary_key("email")
            .state(stratadb_core::CollectionState::Delete)
            .field(FieldSchema::searchable("email").primary_key()),
    );
    let v2 = Database::with_config(replaced, backend, config).unwrap();
    assert!(v2.open().await.unwrap());

    match txn.commit().await {
        TransactionOutcome::Failed(source) => assert_eq!(source, StorageError::Closed),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let txn = v2.begin(&["users"], TransactionMode::ReadOnly).unwrap();
    assert!(txn.collection("users").unwrap().get_all(None, None).unwrap().is_empty());
}

#[tokio::test]
async fn deletion_from_elsewhere_closes_quietly() {
    let db = TestDatabase::open(users_schema(1)).await;
    let other = db.sibling(users_schema(1));

    other.drop_database().await.unwrap();

    assert_eq!(db.state(), ConnectionState::Closed);
    assert!(matches!(
        db.begin(&["users"], TransactionMode::ReadOnly),
        Err(CoreError::NotOpen { .. })
    ));
    db.close().await.unwrap();
}

#[tokio::test]
async fn replace_collection_on_upgrade() {
    let db = TestDatabase::open(users_schema(1)).await;
    db.seed("users", [user_with(1, "a@x.com", 20, &["x"])]).await;
    db.close().await.unwrap();

    let v2 = Schema::new("app", 2).collection(
        CollectionSchema::new("users")
            .primary_key("email")
            .state(stratadb_core::CollectionState::Delete)
            .field(FieldSchema::searchable("handle").unique()),
    );
    let upgraded = db.sibling(v2);
    assert!(upgraded.open().await.unwrap());
    assert_eq!(db.backend.index_names("app", "users"), vec!["handle"]);

    let txn = upgraded.begin(&["users"], TransactionMode::ReadWrite).unwrap();
    let users = txn.collection("users").unwrap();
    assert_eq!(users.count(None).unwrap(), 0);
    let key = users
        .put(Value::map([
            ("email", Value::from("z@x.com")),
            ("handle", Value::from("zed")),
        ]))
        .unwrap();
    assert_eq!(key, stratadb_core::Key::from("z@x.com"));
}
