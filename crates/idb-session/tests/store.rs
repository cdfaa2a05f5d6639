use idb_session::{IdbStore, IdbStoreOptions, MemoryEngine, MemoryEngineOptions, StoreError};
use pollster::block_on;
use serde_json::{json, Value};

fn store_on(engine: &MemoryEngine) -> IdbStore<MemoryEngine> {
    IdbStore::new(engine.clone(), IdbStoreOptions::default()).unwrap()
}

#[test]
fn values_round_trip_through_a_reopened_connection() {
    let engine = MemoryEngine::new();
    let store = store_on(&engine);

    let profile = json!({"name": "ada", "tags": ["x", "y"]});
    block_on(store.set("profile", profile.clone())).unwrap();
    block_on(store.set("count", json!(3))).unwrap();
    store.reset();

    assert_eq!(block_on(store.get("profile")).unwrap(), Some(profile));
    assert_eq!(block_on(store.get("count")).unwrap(), Some(json!(3)));
    assert_eq!(block_on(store.get("missing")).unwrap(), None);
    assert_eq!(engine.open_count(), 2);
}

#[test]
fn stores_built_on_one_engine_share_data() {
    let engine = MemoryEngine::new();
    let writer = store_on(&engine);
    let reader = store_on(&engine);

    block_on(writer.set("k", json!("v"))).unwrap();
    assert_eq!(block_on(reader.get("k")).unwrap(), Some(json!("v")));
}

#[test]
fn set_many_is_all_or_nothing() {
    let engine = MemoryEngine::with_options(MemoryEngineOptions {
        max_value_bytes: Some(16),
        ..MemoryEngineOptions::default()
    });
    let store = store_on(&engine);
    block_on(store.set("keep", json!(1))).unwrap();

    let err = block_on(store.set_many(vec![
        ("a".to_owned(), json!(1)),
        ("b".to_owned(), json!("this value is far too long")),
        ("c".to_owned(), json!(3)),
    ]))
    .unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded), "{err:?}");

    assert_eq!(block_on(store.keys()).unwrap(), vec!["keep"]);

    block_on(store.set_many(vec![
        ("a".to_owned(), json!(1)),
        ("b".to_owned(), json!(2)),
    ]))
    .unwrap();
    assert_eq!(block_on(store.keys()).unwrap(), vec!["a", "b", "keep"]);
}

#[test]
fn get_many_follows_input_order() {
    let store = store_on(&MemoryEngine::new());
    block_on(store.set_many(vec![
        ("a".to_owned(), json!(1)),
        ("b".to_owned(), json!(2)),
    ]))
    .unwrap();

    assert_eq!(
        block_on(store.get_many(&["b", "missing", "a", "b"])).unwrap(),
        vec![Some(json!(2)), None, Some(json!(1)), Some(json!(2))]
    );
    assert!(block_on(store.get_many::<&str>(&[])).unwrap().is_empty());
}

#[test]
fn update_applies_to_current_value() {
    let store = store_on(&MemoryEngine::new());

    block_on(store.update("hits", |current| {
        assert_eq!(current, None);
        Ok::<_, StoreError>(json!(1))
    }))
    .unwrap();
    block_on(store.update("hits", |current| {
        let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
        Ok::<_, StoreError>(json!(n + 41))
    }))
    .unwrap();

    assert_eq!(block_on(store.get("hits")).unwrap(), Some(json!(42)));
}

#[test]
fn failed_update_leaves_value_unchanged() {
    let store = store_on(&MemoryEngine::new());
    block_on(store.set("hits", json!(7))).unwrap();

    let err = block_on(store.update("hits", |_| Err::<Value, _>("not today"))).unwrap_err();
    match err {
        StoreError::Updater(cause) => assert_eq!(cause.to_string(), "not today"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(block_on(store.get("hits")).unwrap(), Some(json!(7)));
}

#[test]
fn deletes_ignore_missing_keys() {
    let store = store_on(&MemoryEngine::new());
    block_on(store.set_many(vec![
        ("a".to_owned(), json!(1)),
        ("b".to_owned(), json!(2)),
        ("c".to_owned(), json!(3)),
    ]))
    .unwrap();

    block_on(store.del("nope")).unwrap();
    block_on(store.del("a")).unwrap();
    block_on(store.del_many(&["b", "zzz"])).unwrap();
    assert_eq!(block_on(store.keys()).unwrap(), vec!["c"]);

    block_on(store.clear()).unwrap();
    assert!(block_on(store.keys()).unwrap().is_empty());
    assert!(block_on(store.entries()).unwrap().is_empty());
}

#[test]
fn cursor_scans_match_bulk_scans() {
    let entries = vec![
        ("b".to_owned(), json!({"n": 2})),
        ("a".to_owned(), json!([1])),
        ("c".to_owned(), json!("three")),
    ];

    let bulk = store_on(&MemoryEngine::new());
    let cursor_engine = MemoryEngine::with_options(MemoryEngineOptions {
        bulk_read: false,
        ..MemoryEngineOptions::default()
    });
    let cursor = store_on(&cursor_engine);
    block_on(bulk.set_many(entries.clone())).unwrap();
    block_on(cursor.set_many(entries)).unwrap();

    assert_eq!(
        block_on(bulk.keys()).unwrap(),
        block_on(cursor.keys()).unwrap()
    );
    assert_eq!(
        block_on(bulk.values()).unwrap(),
        block_on(cursor.values()).unwrap()
    );
    assert_eq!(
        block_on(bulk.entries()).unwrap(),
        block_on(cursor.entries()).unwrap()
    );
    assert_eq!(
        block_on(cursor.entries()).unwrap(),
        vec![
            ("a".to_owned(), json!([1])),
            ("b".to_owned(), json!({"n": 2})),
            ("c".to_owned(), json!("three")),
        ]
    );
}

#[test]
fn custom_runner_targets_another_store() {
    let engine = MemoryEngine::new();
    let store = store_on(&engine);
    let other = store.create_runner("other-db", "things").unwrap();

    block_on(other.set("x", json!(true))).unwrap();
    assert_eq!(block_on(store.get("x")).unwrap(), None);
    assert_eq!(
        engine
            .snapshot("other-db", "things")
            .and_then(|items| items.get("x").cloned()),
        Some(json!(true))
    );
}

#[test]
fn deleted_database_starts_empty() {
    let engine = MemoryEngine::new();
    let store = store_on(&engine);
    block_on(store.set("k", json!(1))).unwrap();

    block_on(store.delete_database()).unwrap();
    assert_eq!(block_on(store.get("k")).unwrap(), None);
}
