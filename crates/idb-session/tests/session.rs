use std::collections::BTreeMap;

use idb_session::capability::{NoGlobals, StaticGlobals};
use idb_session::{
    IdbSession, MemoryEngine, MemoryEngineOptions, MemoryScratch, Prefer, SessionOptions,
};
use pollster::block_on;
use serde_json::{json, Value};

fn browser_session(
    engine: &MemoryEngine,
    scratch: &MemoryScratch,
) -> IdbSession<MemoryEngine, MemoryScratch> {
    IdbSession::new(
        SessionOptions::default(),
        engine.clone(),
        scratch.clone(),
        &StaticGlobals::browser(),
    )
    .unwrap()
}

#[test]
fn items_round_trip_on_both_backends() {
    let engine = MemoryEngine::new();
    let scratch = MemoryScratch::new();
    let session = browser_session(&engine, &scratch);

    for prefer in [Prefer::Auto, Prefer::Fallback] {
        block_on(session.set_item("cfg", &json!({"a": 1}), prefer));
        block_on(session.set_item("list", &json!([1, 2]), prefer));
        assert_eq!(
            block_on(session.get_item("cfg", prefer)),
            Some(json!({"a": 1}))
        );
        assert_eq!(
            block_on(session.get_item("list", prefer)),
            Some(json!([1, 2]))
        );
        assert_eq!(block_on(session.get_item("missing", prefer)), None);
    }

    // Each backend only holds its own writes.
    assert_eq!(scratch.raw("cfg").as_deref(), Some(r#"{"a":1}"#));
    assert_eq!(
        engine
            .snapshot("idbSession", "KeyValue")
            .map(|items| items.len()),
        Some(2)
    );
}

#[test]
fn fallback_scalars_come_back_as_text() {
    let session = browser_session(&MemoryEngine::new(), &MemoryScratch::new());

    block_on(session.set_item("n", &42, Prefer::Fallback));
    block_on(session.set_item("flag", &true, Prefer::Fallback));
    block_on(session.set_item("name", "ada", Prefer::Fallback));

    assert_eq!(
        block_on(session.get_item("n", Prefer::Fallback)),
        Some(json!("42"))
    );
    assert_eq!(
        block_on(session.get_item("flag", Prefer::Fallback)),
        Some(json!("true"))
    );
    assert_eq!(
        block_on(session.get_item("name", Prefer::Fallback)),
        Some(json!("ada"))
    );

    // IndexedDB keeps the structured value.
    block_on(session.set_item("n", &42, Prefer::Auto));
    assert_eq!(
        block_on(session.get_item("n", Prefer::Auto)),
        Some(json!(42))
    );
}

#[test]
fn remove_item_accepts_one_or_many_keys() {
    for prefer in [Prefer::Auto, Prefer::Fallback] {
        let session = browser_session(&MemoryEngine::new(), &MemoryScratch::new());
        block_on(session.set_item("cfg", &json!({"a": 1}), prefer));
        block_on(session.set_item("theme", "dark", prefer));
        block_on(session.set_item("lang", "en", prefer));

        block_on(session.remove_item(["cfg", "missing"], prefer));
        assert_eq!(block_on(session.get_item("cfg", prefer)), None);

        block_on(session.remove_item("", prefer));
        block_on(session.remove_item("theme", prefer));
        assert_eq!(
            block_on(session.get_all_key(prefer)),
            Some(vec!["lang".to_owned()])
        );
    }
}

#[test]
fn get_all_returns_items_and_keys() {
    for prefer in [Prefer::Auto, Prefer::Fallback] {
        let session = browser_session(&MemoryEngine::new(), &MemoryScratch::new());
        assert_eq!(
            block_on(session.get_all_item(prefer)),
            Some(BTreeMap::new())
        );
        assert_eq!(block_on(session.get_all_key(prefer)), Some(Vec::new()));

        block_on(session.set_item("b", &json!({"x": 1}), prefer));
        block_on(session.set_item("a", &json!(["y"]), prefer));

        let expected: BTreeMap<String, Value> = [
            ("a".to_owned(), json!(["y"])),
            ("b".to_owned(), json!({"x": 1})),
        ]
        .into_iter()
        .collect();
        assert_eq!(block_on(session.get_all_item(prefer)), Some(expected));
        assert_eq!(
            block_on(session.get_all_key(prefer)),
            Some(vec!["a".to_owned(), "b".to_owned()])
        );

        block_on(session.clear(prefer));
        assert_eq!(block_on(session.get_all_key(prefer)), Some(Vec::new()));
    }
}

#[test]
fn update_item_reads_then_writes() {
    for prefer in [Prefer::Auto, Prefer::Fallback] {
        let session = browser_session(&MemoryEngine::new(), &MemoryScratch::new());
        block_on(session.set_item("cart", &json!({"items": 1}), prefer));

        block_on(session.update_item(
            "cart",
            |current| {
                let n = current
                    .as_ref()
                    .and_then(|v| v.get("items"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                Ok::<_, std::io::Error>(json!({"items": n + 1}))
            },
            prefer,
        ));
        assert_eq!(
            block_on(session.get_item("cart", prefer)),
            Some(json!({"items": 2}))
        );

        // A failing updater is logged and leaves the value alone.
        let declined = |_: Option<Value>| Err::<Value, _>("declined");
        block_on(session.update_item("cart", declined, prefer));
        assert_eq!(
            block_on(session.get_item("cart", prefer)),
            Some(json!({"items": 2}))
        );
    }
}

#[test]
fn without_indexed_db_everything_goes_to_scratch() {
    let engine = MemoryEngine::new();
    let scratch = MemoryScratch::new();
    let session = IdbSession::new(
        SessionOptions::default(),
        engine.clone(),
        scratch.clone(),
        &NoGlobals,
    )
    .unwrap();
    assert!(!session.uses_indexed_db());

    block_on(session.set_item("cfg", &json!({"a": 1}), Prefer::Auto));
    assert_eq!(
        block_on(session.get_item("cfg", Prefer::Auto)),
        Some(json!({"a": 1}))
    );
    assert_eq!(scratch.len(), 1);
    assert_eq!(engine.open_count(), 0);
}

#[test]
fn backend_failures_are_swallowed() {
    let engine = MemoryEngine::with_options(MemoryEngineOptions {
        max_value_bytes: Some(8),
        ..MemoryEngineOptions::default()
    });
    let scratch = MemoryScratch::with_quota(8);
    let session = browser_session(&engine, &scratch);

    let big = "far more than eight bytes";
    block_on(session.set_item("big", big, Prefer::Auto));
    block_on(session.set_item("big", big, Prefer::Fallback));

    assert_eq!(block_on(session.get_item("big", Prefer::Auto)), None);
    assert_eq!(block_on(session.get_item("big", Prefer::Fallback)), None);
    assert!(scratch.is_empty());
}

#[test]
fn unreachable_store_reads_as_none() {
    let engine = MemoryEngine::new();
    let scratch = MemoryScratch::new();
    let first = browser_session(&engine, &scratch);
    block_on(first.set_item("k", &json!(1), Prefer::Auto));

    // Same database, different object store: the existing database is not upgraded.
    let other = IdbSession::new(
        SessionOptions {
            store_name: "Other".to_owned(),
            ..SessionOptions::default()
        },
        engine.clone(),
        scratch.clone(),
        &StaticGlobals::browser(),
    )
    .unwrap();
    assert_eq!(block_on(other.get_item("k", Prefer::Auto)), None);
    assert_eq!(block_on(other.get_all_item(Prefer::Auto)), None);
    assert_eq!(block_on(other.get_all_key(Prefer::Auto)), None);
}

#[test]
fn namespaces_isolate_indexed_db_but_share_scratch() {
    let engine = MemoryEngine::new();
    let scratch = MemoryScratch::new();
    let tenant = |ns: &str| {
        IdbSession::new(
            SessionOptions {
                namespace: Some(ns.to_owned()),
                ..SessionOptions::default()
            },
            engine.clone(),
            scratch.clone(),
            &StaticGlobals::browser(),
        )
        .unwrap()
    };
    let red = tenant("red");
    let blue = tenant("blue");

    block_on(red.set_item("color", "red", Prefer::Auto));
    assert_eq!(block_on(blue.get_item("color", Prefer::Auto)), None);
    assert!(engine.snapshot("idbSession-red", "KeyValue").is_some());

    block_on(red.set_item("shared", "yes", Prefer::Fallback));
    assert_eq!(
        block_on(blue.get_item("shared", Prefer::Fallback)),
        Some(json!("yes"))
    );
}

#[test]
fn reset_reopens_the_database() {
    let engine = MemoryEngine::new();
    let session = browser_session(&engine, &MemoryScratch::new());

    block_on(session.set_item("k", &json!([1]), Prefer::Auto));
    session.reset();
    assert_eq!(
        block_on(session.get_item("k", Prefer::Auto)),
        Some(json!([1]))
    );
    assert_eq!(engine.open_count(), 2);
}
