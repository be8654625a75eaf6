//! Optimistic props store
//!
//! Overlays local, not-yet-confirmed writes on top of the authoritative
//! props owned by the navigation host. Reads see `snapshot ⊕ override` with
//! override keys winning. The override lives only until the host produces a
//! new snapshot; the first access after that discards it.

use std::fmt;
use std::sync::Arc;

use liveprops_core::PropsMap;
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{NavigationError, StoreError};
use crate::navigation::{NavigationHost, PropsSnapshot, ReloadOptions};

/// New value for a single prop
pub enum PropUpdate {
    /// Replace with this value
    Value(Value),
    /// Compute from the current merged value (`Null` when absent)
    Updater(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl PropUpdate {
    /// Updater from a closure
    pub fn with(f: impl FnOnce(&Value) -> Value + Send + 'static) -> Self {
        Self::Updater(Box::new(f))
    }
}

impl From<Value> for PropUpdate {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for PropUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Partial update across several props
pub enum PropsUpdate {
    /// Merge these keys into the override
    Partial(PropsMap),
    /// Compute a partial map from the current merged props
    Updater(Box<dyn FnOnce(&PropsMap) -> PropsMap + Send>),
}

impl PropsUpdate {
    /// Updater from a closure
    pub fn with(f: impl FnOnce(&PropsMap) -> PropsMap + Send + 'static) -> Self {
        Self::Updater(Box::new(f))
    }
}

impl From<PropsMap> for PropsUpdate {
    fn from(partial: PropsMap) -> Self {
        Self::Partial(partial)
    }
}

impl fmt::Debug for PropsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial(partial) => f.debug_tuple("Partial").field(partial).finish(),
            Self::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Which keys an optimistic write may target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Any key; new keys appear in the merged view
    #[default]
    Permissive,
    /// Only keys present in the current snapshot
    SnapshotOnly,
}

struct StoreState {
    seen: PropsSnapshot,
    overrides: PropsMap,
    dirty: bool,
}

impl StoreState {
    fn merged(&self) -> PropsMap {
        let mut props = self.seen.props().clone();
        for (key, value) in &self.overrides {
            props.insert(key.clone(), value.clone());
        }
        props
    }

    fn merged_value(&self, key: &str) -> Value {
        self.overrides
            .get(key)
            .or_else(|| self.seen.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Optimistic overlay on a navigation host's props.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct OptimisticProps {
    host: Arc<dyn NavigationHost>,
    state: Arc<Mutex<StoreState>>,
    key_policy: KeyPolicy,
}

impl OptimisticProps {
    /// Store over `host` with an empty override
    pub fn new(host: Arc<dyn NavigationHost>) -> Self {
        let seen = host.current_props();
        Self {
            host,
            state: Arc::new(Mutex::new(StoreState {
                seen,
                overrides: PropsMap::new(),
                dirty: false,
            })),
            key_policy: KeyPolicy::default(),
        }
    }

    /// Restrict which keys writes may target
    #[must_use]
    pub fn with_key_policy(mut self, key_policy: KeyPolicy) -> Self {
        self.key_policy = key_policy;
        self
    }

    /// Lock the state after catching up with the host's snapshot
    fn observe(&self) -> MutexGuard<'_, StoreState> {
        let current = self.host.current_props();
        let mut state = self.state.lock();
        if !state.seen.same_as(&current) {
            if !state.overrides.is_empty() {
                debug!(
                    cleared = state.overrides.len(),
                    "New props snapshot, dropping optimistic override"
                );
            }
            state.seen = current;
            state.overrides.clear();
            state.dirty = false;
        }
        state
    }

    /// Lock for a write computed against `base`. `None` when a newer
    /// snapshot arrived in the meantime; the write is then dropped.
    fn observe_unchanged(&self, base: &PropsSnapshot) -> Option<MutexGuard<'_, StoreState>> {
        let state = self.observe();
        if state.seen.same_as(base) {
            Some(state)
        } else {
            debug!("Props snapshot changed during update, dropping optimistic write");
            None
        }
    }

    fn check_key(&self, state: &StoreState, key: &str) -> Result<(), StoreError> {
        if self.key_policy == KeyPolicy::SnapshotOnly && state.seen.get(key).is_none() {
            return Err(StoreError::UnknownProp {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    // ─── Reads ───────────────────────────────────────────────

    /// Merged props, override keys winning
    pub fn props(&self) -> PropsMap {
        self.observe().merged()
    }

    /// One merged prop
    pub fn prop(&self, key: &str) -> Option<Value> {
        let state = self.observe();
        state
            .overrides
            .get(key)
            .or_else(|| state.seen.get(key))
            .cloned()
    }

    /// Merged props decoded into `T`
    pub fn props_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.props())).map_err(|e| StoreError::Shape {
            error: e.to_string(),
        })
    }

    /// The authoritative snapshot currently underlying the merge
    pub fn snapshot(&self) -> PropsSnapshot {
        self.observe().seen.clone()
    }

    /// The pending optimistic writes
    pub fn overrides(&self) -> PropsMap {
        self.observe().overrides.clone()
    }

    /// Whether any optimistic write is pending
    #[must_use]
    pub fn has_optimistic_updates(&self) -> bool {
        self.observe().dirty
    }

    // ─── Writes ──────────────────────────────────────────────

    /// Set one prop optimistically.
    ///
    /// An updater sees the merged value, including earlier writes that have
    /// not been confirmed yet.
    pub fn set_prop(
        &self,
        key: impl Into<String>,
        update: impl Into<PropUpdate>,
    ) -> Result<(), StoreError> {
        match update.into() {
            PropUpdate::Value(value) => self.try_set_prop(key, move |_| Ok(value)),
            PropUpdate::Updater(f) => self.try_set_prop(key, move |current| Ok(f(current))),
        }
    }

    /// Set one prop from a fallible updater. Nothing is written on error.
    pub fn try_set_prop<E>(
        &self,
        key: impl Into<String>,
        f: impl FnOnce(&Value) -> Result<Value, E>,
    ) -> Result<(), E>
    where
        E: From<StoreError>,
    {
        let key = key.into();
        let (base, current) = {
            let state = self.observe();
            self.check_key(&state, &key)?;
            (state.seen.clone(), state.merged_value(&key))
        };
        // The updater runs unlocked so it may read the store
        let value = f(&current)?;
        if let Some(mut state) = self.observe_unchanged(&base) {
            trace!(key = %key, "Optimistic prop write");
            state.overrides.insert(key, value);
            state.dirty = true;
        }
        Ok(())
    }

    /// Merge several props into the override
    pub fn set_props(&self, update: impl Into<PropsUpdate>) -> Result<(), StoreError> {
        let (mut state, partial) = match update.into() {
            PropsUpdate::Partial(partial) => (self.observe(), partial),
            PropsUpdate::Updater(f) => {
                let (base, merged) = {
                    let state = self.observe();
                    (state.seen.clone(), state.merged())
                };
                let partial = f(&merged);
                match self.observe_unchanged(&base) {
                    Some(state) => (state, partial),
                    None => return Ok(()),
                }
            }
        };
        for key in partial.keys() {
            self.check_key(&state, key)?;
        }
        trace!(keys = partial.len(), "Optimistic props write");
        state.overrides.extend(partial);
        state.dirty = true;
        Ok(())
    }

    /// Discard every optimistic write
    pub fn reset_optimistic(&self) {
        let mut state = self.observe();
        if !state.overrides.is_empty() {
            debug!(cleared = state.overrides.len(), "Optimistic override reset");
        }
        state.overrides.clear();
        state.dirty = false;
    }

    /// Ask the host for fresh props.
    ///
    /// The override stays until the new snapshot arrives.
    pub fn reload(&self, options: ReloadOptions) -> Result<(), NavigationError> {
        self.host.reload(options)
    }
}

impl fmt::Debug for OptimisticProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OptimisticProps")
            .field("snapshot_keys", &state.seen.props().len())
            .field("overrides", &state.overrides)
            .field("dirty", &state.dirty)
            .field("key_policy", &self.key_policy)
            .finish()
    }
}
