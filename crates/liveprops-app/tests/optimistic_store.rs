//! Optimistic store properties against the memory navigator.

use liveprops_app::{KeyPolicy, PropUpdate, StoreError};
use liveprops_testkit::{chat_snapshot, message, props, Harness};
use proptest::prelude::*;
use serde_json::{json, Value};

fn push(item: Value) -> PropUpdate {
    PropUpdate::with(move |current| {
        let mut items = current.as_array().cloned().unwrap_or_default();
        items.push(item);
        Value::Array(items)
    })
}

#[test]
fn test_same_turn_updaters_compose_in_order() {
    let harness = Harness::new(chat_snapshot());
    let store = harness.store();

    store.set_prop("messages", push(message(2, "a"))).unwrap();
    store.set_prop("messages", push(message(3, "b"))).unwrap();

    assert_eq!(
        store.prop("messages"),
        Some(json!([message(1, "hi"), message(2, "a"), message(3, "b")]))
    );
}

#[test]
fn test_stores_are_per_consumer() {
    let harness = Harness::new(chat_snapshot());
    let mine = harness.store();
    let theirs = harness.store();

    mine.set_prop("draft", json!("hello")).unwrap();

    assert!(mine.has_optimistic_updates());
    assert!(!theirs.has_optimistic_updates());
    assert_eq!(theirs.prop("draft"), None);
}

#[test]
fn test_snapshot_only_policy() {
    let harness = Harness::new(chat_snapshot());
    let store = harness.store().with_key_policy(KeyPolicy::SnapshotOnly);

    assert!(matches!(
        store.set_prop("draft", json!("x")),
        Err(StoreError::UnknownProp { .. })
    ));
    assert!(store.set_prop("messages", json!([])).is_ok());
}

proptest! {
    #[test]
    fn prop_updaters_append_in_call_order(n in 0usize..8, a in any::<i64>(), b in any::<i64>()) {
        let initial: Vec<Value> = (0..n).map(|i| json!(i)).collect();
        let harness = Harness::new(props(json!({"items": initial})));
        let store = harness.store();

        store.set_prop("items", push(json!(a))).unwrap();
        store.set_prop("items", push(json!(b))).unwrap();

        let items = store.prop("items").unwrap();
        let items = items.as_array().unwrap();
        prop_assert_eq!(items.len(), n + 2);
        prop_assert_eq!(&items[n], &json!(a));
        prop_assert_eq!(&items[n + 1], &json!(b));
    }

    #[test]
    fn prop_navigation_discards_every_write(keys in prop::collection::vec("[a-z]{1,4}", 0..6)) {
        let harness = Harness::new(chat_snapshot());
        let store = harness.store();
        for key in &keys {
            store.set_prop(key.clone(), json!(true)).unwrap();
        }

        let fresh = harness.navigator.deliver(chat_snapshot());
        prop_assert_eq!(store.props(), fresh.props().clone());
        prop_assert!(!store.has_optimistic_updates());
    }
}
