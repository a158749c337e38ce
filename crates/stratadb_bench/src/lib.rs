//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use std::sync::Arc;
use stratadb_core::{CollectionSchema, Config, Database, FieldSchema, Schema};
use stratadb_storage::{MemoryBackend, Value};

/// Schema with one `people` collection keyed by `id` and indexed by `age`
/// and `city`.
#[must_use]
pub fn bench_schema() -> Schema {
    Schema::new("bench", 1).collection(
        CollectionSchema::new("people")
            .primary_key("id")
            .field(FieldSchema::searchable("age"))
            .field(FieldSchema::searchable("city")),
    )
}

/// Generates `count` person records with random ages and cities.
#[must_use]
pub fn generate_people(count: usize) -> Vec<Value> {
    const CITIES: [&str; 5] = ["Arusha", "Dodoma", "Mbeya", "Moshi", "Tanga"];
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            Value::map([
                ("id", Value::from(i64::try_from(i).unwrap_or(i64::MAX))),
                ("age", Value::from(rng.gen_range(0i64..100))),
                ("city", Value::from(CITIES[rng.gen_range(0..CITIES.len())])),
                ("bio", Value::from("x".repeat(rng.gen_range(16..128)))),
            ])
        })
        .collect()
}

/// A single-threaded runtime for driving async APIs from benchmarks.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
#[must_use]
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("Failed to build runtime")
}

/// Opens [`bench_schema`] on a fresh in-memory host.
///
/// # Panics
///
/// Panics if the database cannot be opened.
#[must_use]
pub fn open_database(rt: &tokio::runtime::Runtime) -> Database {
    let config = Config::new().close_grace(std::time::Duration::ZERO);
    let db = Database::with_config(bench_schema(), Arc::new(MemoryBackend::new()), config)
        .expect("Failed to create database");
    rt.block_on(db.open()).expect("Failed to open database");
    db
}
