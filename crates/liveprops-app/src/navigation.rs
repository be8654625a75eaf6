//! Navigation host seam
//!
//! The page navigation framework owns the authoritative props. liveprops only
//! reads the current snapshot and asks for reloads; the framework delivers
//! the result by replacing its snapshot.

use std::sync::Arc;

use liveprops_core::PropsMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::NavigationError;

/// Immutable authoritative props.
///
/// Identity, not content, marks a new snapshot: two snapshots built from
/// equal maps are still different snapshots.
#[derive(Debug, Clone, Default)]
pub struct PropsSnapshot(Arc<PropsMap>);

impl PropsSnapshot {
    /// Wrap a props map
    pub fn new(props: PropsMap) -> Self {
        Self(Arc::new(props))
    }

    /// Build a snapshot from a JSON object
    pub fn from_value(value: Value) -> Result<Self, NavigationError> {
        match value {
            Value::Object(props) => Ok(Self::new(props)),
            Value::Null => Err(NavigationError::NotAnObject("null")),
            Value::Bool(_) => Err(NavigationError::NotAnObject("bool")),
            Value::Number(_) => Err(NavigationError::NotAnObject("number")),
            Value::String(_) => Err(NavigationError::NotAnObject("string")),
            Value::Array(_) => Err(NavigationError::NotAnObject("array")),
        }
    }

    /// The props
    pub fn props(&self) -> &PropsMap {
        &self.0
    }

    /// One prop
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether both handles are the same snapshot
    pub fn same_as(&self, other: &PropsSnapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<PropsMap> for PropsSnapshot {
    fn from(props: PropsMap) -> Self {
        Self::new(props)
    }
}

/// Options for a props reload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadOptions {
    /// Restrict the reload to these props
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,
    /// Keep the scroll position
    #[serde(default = "default_true")]
    pub preserve_scroll: bool,
    /// Keep local component state
    #[serde(default = "default_true")]
    pub preserve_state: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            only: None,
            preserve_scroll: true,
            preserve_state: true,
        }
    }
}

impl ReloadOptions {
    /// Reload only `keys`
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: Some(keys.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// The page navigation framework, as seen from liveprops
pub trait NavigationHost: Send + Sync {
    /// Current authoritative props
    fn current_props(&self) -> PropsSnapshot;

    /// Start a server round-trip. The new props arrive later as a new
    /// snapshot; an error means the round-trip could not be started.
    fn reload(&self, options: ReloadOptions) -> Result<(), NavigationError>;
}

struct NavigatorInner {
    current: RwLock<PropsSnapshot>,
    reloads: Mutex<Vec<ReloadOptions>>,
    server: RwLock<Option<PropsMap>>,
}

/// In-memory navigation host.
///
/// Records reload requests. When a server state is installed with
/// [`MemoryNavigator::serve_from`], reloads are answered immediately with a
/// new snapshot whose reloaded keys come from that state.
#[derive(Clone)]
pub struct MemoryNavigator {
    inner: Arc<NavigatorInner>,
}

impl MemoryNavigator {
    /// Navigator showing `initial`
    pub fn new(initial: PropsMap) -> Self {
        Self {
            inner: Arc::new(NavigatorInner {
                current: RwLock::new(PropsSnapshot::new(initial)),
                reloads: Mutex::new(Vec::new()),
                server: RwLock::new(None),
            }),
        }
    }

    /// Simulate a navigation delivering fresh props
    pub fn deliver(&self, props: PropsMap) -> PropsSnapshot {
        let snapshot = PropsSnapshot::new(props);
        *self.inner.current.write() = snapshot.clone();
        snapshot
    }

    /// Answer future reloads from `server`
    pub fn serve_from(&self, server: PropsMap) {
        *self.inner.server.write() = Some(server);
    }

    /// Reload requests received so far
    pub fn reloads(&self) -> Vec<ReloadOptions> {
        self.inner.reloads.lock().clone()
    }
}

impl NavigationHost for MemoryNavigator {
    fn current_props(&self) -> PropsSnapshot {
        self.inner.current.read().clone()
    }

    fn reload(&self, options: ReloadOptions) -> Result<(), NavigationError> {
        debug!(only = ?options.only, "Reload requested");
        self.inner.reloads.lock().push(options.clone());

        let Some(server) = self.inner.server.read().clone() else {
            return Ok(());
        };
        let mut props = self.current_props().props().clone();
        for (key, value) in server {
            let wanted = options
                .only
                .as_ref()
                .map_or(true, |only| only.iter().any(|k| *k == key));
            if wanted {
                props.insert(key, value);
            }
        }
        self.deliver(props);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> PropsMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_snapshot_identity_not_content() {
        let a = PropsSnapshot::new(map(json!({"count": 1})));
        let b = PropsSnapshot::new(map(json!({"count": 1})));
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(PropsSnapshot::from_value(json!({"a": 1})).is_ok());
        assert_eq!(
            PropsSnapshot::from_value(json!([1])).unwrap_err(),
            NavigationError::NotAnObject("array")
        );
    }

    #[test]
    fn test_reload_options_wire_format() {
        let options = ReloadOptions::only(["messages"]);
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({"only": ["messages"], "preserveScroll": true, "preserveState": true})
        );
    }

    #[test]
    fn test_reload_served_for_only_keys() {
        let navigator = MemoryNavigator::new(map(json!({"messages": [], "user": "ann"})));
        navigator.serve_from(map(json!({"messages": [1], "user": "bob"})));
        let before = navigator.current_props();

        navigator.reload(ReloadOptions::only(["messages"])).unwrap();

        let after = navigator.current_props();
        assert!(!after.same_as(&before));
        assert_eq!(after.get("messages"), Some(&json!([1])));
        assert_eq!(after.get("user"), Some(&json!("ann")));
        assert_eq!(navigator.reloads().len(), 1);
    }

    #[test]
    fn test_reload_without_server_only_records() {
        let navigator = MemoryNavigator::new(PropsMap::new());
        let before = navigator.current_props();
        navigator.reload(ReloadOptions::default()).unwrap();
        assert!(navigator.current_props().same_as(&before));
        assert_eq!(navigator.reloads(), vec![ReloadOptions::default()]);
    }
}
