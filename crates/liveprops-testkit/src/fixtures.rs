//! Props and payload fixtures

use liveprops_core::{Payload, PropsMap};
use serde_json::{json, Value};

/// Convert a JSON object literal into a [`PropsMap`].
///
/// # Panics
///
/// Panics when `value` is not an object.
pub fn props(value: Value) -> PropsMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A chat page with one message
pub fn chat_snapshot() -> PropsMap {
    props(json!({
        "messages": [{"id": 1, "content": "hi"}],
        "room": {"id": 42, "name": "lobby"},
    }))
}

/// A chat message
pub fn message(id: u64, content: &str) -> Value {
    json!({"id": id, "content": content})
}

/// `message_created` payload wrapping a message
pub fn message_created(id: u64, content: &str) -> Payload {
    json!({"message": message(id, content)})
}

/// A presence meta with the given ref
pub fn meta(phx_ref: &str) -> Value {
    json!({"phx_ref": phx_ref, "online_at": 0})
}

/// `presence_state` payload with one meta per id
pub fn presence_state(entries: &[(&str, &str)]) -> Payload {
    let state: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(id, phx_ref)| (id.to_string(), json!({"metas": [meta(phx_ref)]})))
        .collect();
    Value::Object(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_snapshot_shape() {
        let snapshot = chat_snapshot();
        assert_eq!(snapshot["messages"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_presence_state_shape() {
        let state = presence_state(&[("u1", "a")]);
        assert_eq!(state["u1"]["metas"][0]["phx_ref"], "a");
    }
}
