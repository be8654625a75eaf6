//! JSON shapes exchanged between the transport and the props store.

use serde_json::{Map, Value};

/// Body of an inbound or outbound channel event.
pub type Payload = Value;

/// String-keyed page data, both for authoritative snapshots and overrides.
pub type PropsMap = Map<String, Value>;

/// Connection or join parameters.
pub type Params = Map<String, Value>;

/// Read `field` from `value` when it is a JSON object.
///
/// Returns `None` for non-objects and for objects without the field; a
/// present `null` is returned as `Some(&Value::Null)`.
pub fn lookup_field<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    value.as_object().and_then(|object| object.get(field))
}
