//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys, records and schemas that
//! respect the store's invariants.

use proptest::prelude::*;
use stratadb_core::{CollectionSchema, CollectionState, FieldSchema, QueryOp, Schema};
use stratadb_storage::{Key, Value};

/// Strategy for generating valid collection and field names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating valid keys, including nested arrays.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    let leaf = prop_oneof![
        (-1.0e9f64..1.0e9).prop_map(|n| Key::number(n).expect("finite number")),
        any::<i32>().prop_map(Key::from),
        "[a-z]{0,8}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Key::Bytes),
    ];
    leaf.prop_recursive(2, 8, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Key::Array)
    })
}

/// Strategy for generating values usable as keys.
pub fn key_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>()
            .prop_map(|n| n % (1 << 53))
            .prop_map(Value::from),
        "[a-z]{1,8}".prop_map(Value::from),
    ]
}

/// Strategy for generating comparison operators, including none.
pub fn query_op_strategy() -> impl Strategy<Value = Option<QueryOp>> {
    prop_oneof![
        Just(None),
        Just(Some(QueryOp::GreaterThan)),
        Just(Some(QueryOp::GreaterThanEqualTo)),
        Just(Some(QueryOp::LessThan)),
        Just(Some(QueryOp::LessThanEqualTo)),
    ]
}

/// Strategy for generating user records with ids in `0..max_id`.
pub fn user_strategy(max_id: i64) -> impl Strategy<Value = Value> {
    (0..max_id, 0i64..120, prop::collection::vec("[a-c]", 0..3)).prop_map(|(id, age, tags)| {
        Value::map([
            ("id", Value::from(id)),
            ("email", Value::from(format!("user{id}@x.com"))),
            ("age", Value::from(age)),
            (
                "tags",
                Value::Array(tags.into_iter().map(Value::from).collect()),
            ),
        ])
    })
}

/// Strategy for generating fields.
pub fn field_strategy() -> impl Strategy<Value = FieldSchema> {
    (name_strategy(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(name, searchable, unique, multi_entry)| FieldSchema {
            searchable,
            unique,
            multi_entry,
            ..FieldSchema::new(name)
        },
    )
}

/// Strategy for generating collections with distinct field names.
pub fn collection_strategy() -> impl Strategy<Value = CollectionSchema> {
    (
        name_strategy(),
        prop::option::of(name_strategy()),
        prop::bool::ANY,
        prop::collection::vec(field_strategy(), 0..5),
    )
        .prop_map(|(name, primary_key, delete, fields)| {
            let mut seen = std::collections::HashSet::new();
            CollectionSchema {
                name,
                primary_key,
                state: if delete {
                    CollectionState::Delete
                } else {
                    CollectionState::Create
                },
                fields: fields
                    .into_iter()
                    .filter(|f| seen.insert(f.name.clone()))
                    .collect(),
            }
        })
}

/// Strategy for generating valid schemas.
pub fn schema_strategy() -> impl Strategy<Value = Schema> {
    (
        name_strategy(),
        1u64..10,
        prop::collection::vec(collection_strategy(), 0..5),
    )
        .prop_map(|(name, version, collections)| {
            let mut seen = std::collections::HashSet::new();
            Schema {
                name,
                version,
                collections: collections
                    .into_iter()
                    .filter(|c| seen.insert(c.name.clone()))
                    .collect(),
            }
        })
}
