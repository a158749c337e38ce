//! Property tests across the core and the in-memory host.

use proptest::prelude::*;
use std::sync::Arc;
use stratadb_core::{build_range, Database, QueryOp, TransactionMode};
use stratadb_storage::{Key, MemoryBackend, StoreBackend};
use stratadb_testkit::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn range_contains_its_bound_iff_inclusive(
        value in key_value_strategy(),
        op in query_op_strategy(),
    ) {
        let range = build_range(&value, op).unwrap();
        let key = Key::from_value(&value).unwrap();
        let inclusive = !matches!(op, Some(QueryOp::GreaterThan | QueryOp::LessThan));
        prop_assert_eq!(range.includes(&key), inclusive);
    }

    #[test]
    fn fresh_open_builds_declared_structure(schema in schema_strategy()) {
        let backend = Arc::new(MemoryBackend::new());
        let db = Database::with_config(schema.clone(), backend.clone(), fast_config()).unwrap();
        let created = runtime().block_on(db.open()).unwrap();

        prop_assert_eq!(created, !schema.collections.is_empty());
        prop_assert_eq!(backend.database_version(&schema.name), Some(schema.version));

        let mut expected: Vec<String> = schema.collections.iter().map(|c| c.name.clone()).collect();
        expected.sort();
        prop_assert_eq!(backend.store_names(&schema.name), expected);

        for collection in &schema.collections {
            let mut indexes: Vec<String> = collection.indexes().map(|f| f.name.clone()).collect();
            indexes.sort();
            prop_assert_eq!(backend.index_names(&schema.name, &collection.name), indexes);
        }
    }

    #[test]
    fn reopening_is_idempotent(schema in schema_strategy()) {
        let rt = runtime();
        let backend = Arc::new(MemoryBackend::new());
        let first = Database::with_config(schema.clone(), backend.clone(), fast_config()).unwrap();
        rt.block_on(first.open()).unwrap();
        rt.block_on(first.close()).unwrap();

        let second = Database::with_config(schema.clone(), backend.clone(), fast_config()).unwrap();
        prop_assert!(!rt.block_on(second.open()).unwrap());
        prop_assert!(second.last_migration().is_none());
    }

    #[test]
    fn committed_users_are_all_readable(users in prop::collection::vec(user_strategy(50), 0..30)) {
        let rt = runtime();
        let db = rt.block_on(TestDatabase::open(users_schema(1)));
        rt.block_on(db.seed("users", users.clone()));

        let mut ids: Vec<i64> = users
            .iter()
            .filter_map(|u| u.get("id").and_then(|v| v.as_integer()))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let txn = db.begin(&["users"], TransactionMode::ReadOnly).unwrap();
        let keys = txn.collection("users").unwrap().get_all_keys(None, None).unwrap();
        let expected: Vec<Key> = ids.into_iter().map(Key::from).collect();
        prop_assert_eq!(keys, expected);
    }
}
