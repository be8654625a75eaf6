//! Declarative channel props
//!
//! Maps channel events onto optimistic writes. Each event is configured
//! either with a callback that drives the store by hand, or with a
//! [`StrategyUpdate`] describing how the payload changes one prop:
//!
//! | strategy  | new value of `prop` (current `cur`, payload `p`)        |
//! |-----------|----------------------------------------------------------|
//! | `Append`  | `cur` followed by `transform(p)`                         |
//! | `Prepend` | `transform(p)` followed by `cur`                         |
//! | `Remove`  | `cur` without the items matching `p`                     |
//! | `Update`  | items matching `transform(p)` replaced by it             |
//! | `Upsert`  | as `Update`, appended when nothing matches               |
//! | `Replace` | `transform(p)`                                           |
//! | `Reload`  | unchanged; the host reloads `only`                       |
//!
//! Items are matched by an identity field (default `"id"`) or by a caller
//! predicate, never by deep equality.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use liveprops_core::{lookup_field, LiveError, Payload, PropsMap};
use liveprops_transport::{Connection, EventHandler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DispatchError, NavigationError, StoreError};
use crate::navigation::{NavigationHost, ReloadOptions};
use crate::optimistic::{OptimisticProps, PropUpdate, PropsUpdate};
use crate::subscription::{ChannelHandle, HandlerMap, SubscriptionOptions, TopicSubscription};

/// Default identity field for list items
pub const DEFAULT_KEY: &str = "id";

/// How an event changes its prop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Add to the end of a list
    Append,
    /// Add to the front of a list
    Prepend,
    /// Drop matching list items
    Remove,
    /// Replace matching list items
    Update,
    /// Replace matching list items, or append
    Upsert,
    /// Replace the whole value
    Replace,
    /// Ask the host for fresh props
    Reload,
}

impl Strategy {
    /// Whether the strategy treats the prop as a list
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            Self::Append | Self::Prepend | Self::Remove | Self::Update | Self::Upsert
        )
    }
}

/// Payload to value
pub type Transform = Arc<dyn Fn(&Payload) -> Result<Value, LiveError> + Send + Sync>;

/// `(item, payload)` predicate locating list items
pub type Matcher = Arc<dyn Fn(&Value, &Payload) -> bool + Send + Sync>;

/// Hand-written event handler
pub type EventCallback = Arc<dyn Fn(&Payload, &DispatchContext) -> Result<(), LiveError> + Send + Sync>;

/// Strategy configuration for one event
#[derive(Clone)]
pub struct StrategyUpdate {
    /// Target prop
    pub prop: String,
    /// What to do with it
    pub strategy: Strategy,
    /// Payload to value; identity when `None`
    pub transform: Option<Transform>,
    /// Item predicate; identity-field comparison when `None`
    pub matcher: Option<Matcher>,
    /// Identity field; [`DEFAULT_KEY`] when `None`
    pub key: Option<String>,
    /// Props to reload, for [`Strategy::Reload`]
    pub only: Option<Vec<String>>,
}

impl StrategyUpdate {
    /// Update of `prop` with `strategy`
    pub fn new(prop: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            prop: prop.into(),
            strategy,
            transform: None,
            matcher: None,
            key: None,
            only: None,
        }
    }

    /// Append to `prop`
    pub fn append(prop: impl Into<String>) -> Self {
        Self::new(prop, Strategy::Append)
    }

    /// Prepend to `prop`
    pub fn prepend(prop: impl Into<String>) -> Self {
        Self::new(prop, Strategy::Prepend)
    }

    /// Remove from `prop`
    pub fn remove(prop: impl Into<String>) -> Self {
        Self::new(prop, Strategy::Remove)
    }

    /// Update items of `prop`
    pub fn update(prop: impl Into<String>) -> Self {
        Self::new(prop, Strategy::Update)
    }

    /// Upsert into `prop`
    pub fn upsert(prop: impl Into<String>) -> Self {
        Self::new(prop, Strategy::Upsert)
    }

    /// Replace `prop`
    pub fn replace(prop: impl Into<String>) -> Self {
        Self::new(prop, Strategy::Replace)
    }

    /// Reload `only` these props
    pub fn reload<I, S>(only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut update = Self::new(String::new(), Strategy::Reload);
        update.only = Some(only.into_iter().map(Into::into).collect());
        update
    }

    /// Reload every prop
    pub fn reload_all() -> Self {
        Self::new(String::new(), Strategy::Reload)
    }

    /// Infallible transform
    #[must_use]
    pub fn transform(mut self, f: impl Fn(&Payload) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(move |payload: &Payload| Ok::<_, LiveError>(f(payload))));
        self
    }

    /// Fallible transform
    #[must_use]
    pub fn try_transform(
        mut self,
        f: impl Fn(&Payload) -> Result<Value, LiveError> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Transform that extracts `field` from the payload; fails when absent
    #[must_use]
    pub fn pluck(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.try_transform(move |payload: &Payload| {
            lookup_field(payload, &field)
                .cloned()
                .ok_or_else(|| LiveError::missing(format!("payload field '{field}'")))
        })
    }

    /// Custom item predicate
    #[must_use]
    pub fn matcher(mut self, f: impl Fn(&Value, &Payload) -> bool + Send + Sync + 'static) -> Self {
        self.matcher = Some(Arc::new(f));
        self
    }

    /// Identity field
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn key_field(&self) -> &str {
        self.key.as_deref().unwrap_or(DEFAULT_KEY)
    }

    fn transformed(&self, payload: &Payload) -> Result<Value, DispatchError> {
        match &self.transform {
            Some(transform) => transform(payload).map_err(|source| DispatchError::Transform {
                prop: self.prop.clone(),
                source,
            }),
            None => Ok(payload.clone()),
        }
    }

    fn reload_options(&self) -> ReloadOptions {
        ReloadOptions {
            only: self.only.clone(),
            ..ReloadOptions::default()
        }
    }
}

impl fmt::Debug for StrategyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyUpdate")
            .field("prop", &self.prop)
            .field("strategy", &self.strategy)
            .field("transform", &self.transform.is_some())
            .field("matcher", &self.matcher.is_some())
            .field("key", &self.key_field())
            .field("only", &self.only)
            .finish()
    }
}

/// Configuration for one event
#[derive(Clone)]
pub enum EventConfig {
    /// Full manual control
    Callback(EventCallback),
    /// Declarative update of one prop
    Strategy(StrategyUpdate),
}

impl EventConfig {
    /// Callback config from a closure
    pub fn callback(
        f: impl Fn(&Payload, &DispatchContext) -> Result<(), LiveError> + Send + Sync + 'static,
    ) -> Self {
        Self::Callback(Arc::new(f))
    }
}

impl From<StrategyUpdate> for EventConfig {
    fn from(update: StrategyUpdate) -> Self {
        Self::Strategy(update)
    }
}

impl fmt::Debug for EventConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback(..)"),
            Self::Strategy(update) => f.debug_tuple("Strategy").field(update).finish(),
        }
    }
}

/// Event name to configuration; `None` entries are skipped
pub type EventConfigs = IndexMap<String, Option<EventConfig>>;

/// What a callback config may do with the store
#[derive(Debug, Clone)]
pub struct DispatchContext {
    store: OptimisticProps,
}

impl DispatchContext {
    /// Merged props
    pub fn props(&self) -> PropsMap {
        self.store.props()
    }

    /// One merged prop
    pub fn prop(&self, key: &str) -> Option<Value> {
        self.store.prop(key)
    }

    /// See [`OptimisticProps::set_prop`]
    pub fn set_prop(
        &self,
        key: impl Into<String>,
        update: impl Into<PropUpdate>,
    ) -> Result<(), StoreError> {
        self.store.set_prop(key, update)
    }

    /// See [`OptimisticProps::set_props`]
    pub fn set_props(&self, update: impl Into<PropsUpdate>) -> Result<(), StoreError> {
        self.store.set_props(update)
    }

    /// See [`OptimisticProps::reload`]
    pub fn reload(&self, options: ReloadOptions) -> Result<(), NavigationError> {
        self.store.reload(options)
    }
}

// ─── Strategies ──────────────────────────────────────────

fn as_sequence(prop: &str, current: &Value) -> Result<Vec<Value>, DispatchError> {
    match current {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        _ => Err(DispatchError::NotASequence {
            prop: prop.to_string(),
        }),
    }
}

/// Locates items for remove/update/upsert
enum Locator<'a> {
    Predicate(&'a Matcher, &'a Payload),
    Identity(&'a str, Value),
}

impl Locator<'_> {
    fn matches(&self, item: &Value) -> bool {
        match self {
            Self::Predicate(matcher, payload) => matcher(item, payload),
            Self::Identity(key, id) => lookup_field(item, key) == Some(id),
        }
    }
}

fn locator<'a>(
    update: &'a StrategyUpdate,
    payload: &'a Payload,
    value: &Value,
) -> Result<Locator<'a>, DispatchError> {
    if let Some(matcher) = &update.matcher {
        return Ok(Locator::Predicate(matcher, payload));
    }
    let key = update.key_field();
    let id = lookup_field(value, key)
        .cloned()
        .ok_or_else(|| DispatchError::MissingKey {
            prop: update.prop.clone(),
            key: key.to_string(),
        })?;
    Ok(Locator::Identity(key, id))
}

/// Compute the new value of `update.prop` from its current value.
///
/// `current` is the merged value, `Null` when absent. [`Strategy::Reload`]
/// returns it unchanged.
pub fn apply_strategy(
    current: &Value,
    update: &StrategyUpdate,
    payload: &Payload,
) -> Result<Value, DispatchError> {
    let prop = update.prop.as_str();
    match update.strategy {
        Strategy::Reload => Ok(current.clone()),
        Strategy::Replace => update.transformed(payload),
        Strategy::Append => {
            let mut items = as_sequence(prop, current)?;
            items.push(update.transformed(payload)?);
            Ok(Value::Array(items))
        }
        Strategy::Prepend => {
            let mut items = as_sequence(prop, current)?;
            items.insert(0, update.transformed(payload)?);
            Ok(Value::Array(items))
        }
        Strategy::Remove => {
            let mut items = as_sequence(prop, current)?;
            let value = update.transformed(payload)?;
            let locator = locator(update, payload, &value)?;
            items.retain(|item| !locator.matches(item));
            Ok(Value::Array(items))
        }
        Strategy::Update | Strategy::Upsert => {
            let items = as_sequence(prop, current)?;
            let value = update.transformed(payload)?;
            let locator = locator(update, payload, &value)?;
            let mut found = false;
            let mut items: Vec<Value> = items
                .into_iter()
                .map(|item| {
                    if locator.matches(&item) {
                        found = true;
                        value.clone()
                    } else {
                        item
                    }
                })
                .collect();
            if !found && update.strategy == Strategy::Upsert {
                items.push(value);
            }
            Ok(Value::Array(items))
        }
    }
}

// ─── Handlers ────────────────────────────────────────────

fn strategy_handler(event: String, update: StrategyUpdate, store: OptimisticProps) -> EventHandler {
    Arc::new(move |payload: &Payload| {
        if update.strategy == Strategy::Reload {
            debug!(event = %event, only = ?update.only, "Reloading props");
            return store
                .reload(update.reload_options())
                .map_err(|e| DispatchError::from(e).for_event(&event));
        }
        store
            .try_set_prop(update.prop.clone(), |current| {
                apply_strategy(current, &update, payload)
            })
            .map_err(|e: DispatchError| e.for_event(&event))?;
        debug!(event = %event, prop = %update.prop, strategy = ?update.strategy, "Applied channel update");
        Ok(())
    })
}

fn callback_handler(callback: EventCallback, store: OptimisticProps) -> EventHandler {
    let context = DispatchContext { store };
    Arc::new(move |payload: &Payload| callback(payload, &context))
}

/// Turn event configs into subscription handlers writing to `store`
pub fn build_handlers(configs: &EventConfigs, store: &OptimisticProps) -> HandlerMap {
    let mut handlers = HandlerMap::new();
    for (event, config) in configs {
        let handler = match config {
            Some(EventConfig::Callback(callback)) => callback_handler(callback.clone(), store.clone()),
            Some(EventConfig::Strategy(update)) => {
                strategy_handler(event.clone(), update.clone(), store.clone())
            }
            None => continue,
        };
        handlers.insert(event.clone(), handler);
    }
    handlers
}

/// A topic subscription whose events write to an optimistic props store
pub struct DeclarativeChannelProps {
    store: OptimisticProps,
    subscription: TopicSubscription,
}

impl DeclarativeChannelProps {
    /// Fresh store over `host`, subscribed through `connection`
    pub fn new(connection: Connection, host: Arc<dyn NavigationHost>) -> Self {
        Self::with_store(connection, OptimisticProps::new(host))
    }

    /// Use an existing store
    pub fn with_store(connection: Connection, store: OptimisticProps) -> Self {
        Self {
            store,
            subscription: TopicSubscription::new(connection),
        }
    }

    /// Reconcile with the consumer's current inputs
    pub fn sync(
        &mut self,
        topic: Option<&str>,
        configs: &EventConfigs,
        options: SubscriptionOptions,
    ) -> Result<&OptimisticProps, LiveError> {
        let handlers = build_handlers(configs, &self.store);
        self.subscription.sync(topic, handlers, options)?;
        Ok(&self.store)
    }

    /// The props store
    pub fn store(&self) -> &OptimisticProps {
        &self.store
    }

    /// The underlying subscription
    pub fn subscription(&self) -> &TopicSubscription {
        &self.subscription
    }

    /// The joined channel, if any
    pub fn channel(&self) -> Option<ChannelHandle> {
        self.subscription.channel()
    }
}

impl fmt::Debug for DeclarativeChannelProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarativeChannelProps")
            .field("store", &self.store)
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn apply(current: Value, update: &StrategyUpdate, payload: Value) -> Result<Value, DispatchError> {
        apply_strategy(&current, update, &payload)
    }

    #[test]
    fn test_append_and_prepend() {
        let cur = json!([{"id": 1}]);
        assert_eq!(
            apply(cur.clone(), &StrategyUpdate::append("m"), json!({"id": 2})).unwrap(),
            json!([{"id": 1}, {"id": 2}])
        );
        assert_eq!(
            apply(cur, &StrategyUpdate::prepend("m"), json!({"id": 0})).unwrap(),
            json!([{"id": 0}, {"id": 1}])
        );
    }

    #[test]
    fn test_null_is_an_empty_list() {
        assert_eq!(
            apply(Value::Null, &StrategyUpdate::append("m"), json!(1)).unwrap(),
            json!([1])
        );
    }

    #[test]
    fn test_non_list_is_rejected() {
        assert_matches!(
            apply(json!({"a": 1}), &StrategyUpdate::append("m"), json!(1)),
            Err(DispatchError::NotASequence { prop }) if prop == "m"
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let update = StrategyUpdate::remove("m");
        let once = apply(json!([{"id": 1}, {"id": 2}]), &update, json!({"id": 1})).unwrap();
        let twice = apply(once.clone(), &update, json!({"id": 1})).unwrap();
        assert_eq!(once, json!([{"id": 2}]));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_upsert_replaces_or_appends() {
        let cur = json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]);
        let update = StrategyUpdate::upsert("m");

        assert_eq!(
            apply(cur.clone(), &update, json!({"id": 1, "v": "z"})).unwrap(),
            json!([{"id": 1, "v": "z"}, {"id": 2, "v": "b"}])
        );
        assert_eq!(
            apply(cur, &update, json!({"id": 3, "v": "c"})).unwrap(),
            json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}, {"id": 3, "v": "c"}])
        );
    }

    #[test]
    fn test_update_leaves_missing_items_alone() {
        let cur = json!([{"id": 1, "v": "a"}]);
        assert_eq!(
            apply(cur.clone(), &StrategyUpdate::update("m"), json!({"id": 9, "v": "z"})).unwrap(),
            cur
        );
    }

    #[test]
    fn test_custom_key_and_transform() {
        let update = StrategyUpdate::update("users").key("uuid").pluck("user");
        let cur = json!([{"uuid": "a", "name": "ann"}]);
        assert_eq!(
            apply(cur, &update, json!({"user": {"uuid": "a", "name": "anna"}})).unwrap(),
            json!([{"uuid": "a", "name": "anna"}])
        );
    }

    #[test]
    fn test_missing_key_is_an_error() {
        assert_matches!(
            apply(json!([]), &StrategyUpdate::upsert("m"), json!({"name": "x"})),
            Err(DispatchError::MissingKey { key, .. }) if key == "id"
        );
    }

    #[test]
    fn test_matcher_overrides_identity() {
        let update = StrategyUpdate::remove("m").matcher(|item, payload| item["room"] == payload["room"]);
        assert_eq!(
            apply(json!([{"room": 1}, {"room": 2}]), &update, json!({"room": 2})).unwrap(),
            json!([{"room": 1}])
        );
    }

    #[test]
    fn test_transform_failure_propagates() {
        let update = StrategyUpdate::append("m").pluck("message");
        assert_matches!(
            apply(json!([]), &update, json!({})),
            Err(DispatchError::Transform { prop, .. }) if prop == "m"
        );
    }

    #[test]
    fn test_replace_has_no_list_assumption() {
        let update = StrategyUpdate::replace("count").transform(|p| p["n"].clone());
        assert_eq!(apply(json!("old"), &update, json!({"n": 3})).unwrap(), json!(3));
    }

    #[test]
    fn test_none_configs_are_skipped() {
        let navigator = crate::navigation::MemoryNavigator::new(PropsMap::new());
        let store = OptimisticProps::new(Arc::new(navigator));
        let mut configs = EventConfigs::new();
        configs.insert("a".into(), Some(StrategyUpdate::append("m").into()));
        configs.insert("b".into(), None);

        let handlers = build_handlers(&configs, &store);
        assert_eq!(handlers.events().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_reload_scope() {
        assert_eq!(StrategyUpdate::reload_all().reload_options().only, None);
        assert_eq!(
            StrategyUpdate::reload(["messages"]).reload_options().only,
            Some(vec!["messages".to_string()])
        );
        assert_eq!(
            apply(json!([1]), &StrategyUpdate::reload_all(), json!({})).unwrap(),
            json!([1])
        );
    }

    #[test]
    fn test_strategy_wire_names() {
        assert_eq!(serde_json::to_value(Strategy::Upsert).unwrap(), json!("upsert"));
        assert!(Strategy::Remove.is_sequence());
        assert!(!Strategy::Replace.is_sequence());
    }
}
