//! Presence aggregation over a topic subscription

use std::fmt;
use std::sync::Arc;

use liveprops_core::{LiveError, Params, Payload, Topic};
use liveprops_transport::{
    Connection, Meta, PresenceChange, PresenceDiff, PresenceEntry, PresenceState,
    PresenceTracker, PRESENCE_DIFF_EVENT, PRESENCE_STATE_EVENT,
};
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::subscription::{HandlerMap, SubscriptionOptions, SubscriptionPhase, TopicSubscription};

/// Called after every applied state or diff
pub type SyncCallback = Arc<dyn Fn() + Send + Sync>;

/// Called per joining id with its previous entry and the joined metas
pub type JoinCallback = Arc<dyn Fn(&str, Option<&PresenceEntry>, &PresenceEntry) + Send + Sync>;

/// Called per leaving id with its remaining entry and the left metas
pub type LeaveCallback = Arc<dyn Fn(&str, &PresenceEntry, &PresenceEntry) + Send + Sync>;

/// Per-pass presence options
#[derive(Clone)]
pub struct PresenceOptions {
    /// When false, no channel exists
    pub enabled: bool,
    /// Join params
    pub params: Params,
    /// Presence changed
    pub on_sync: Option<SyncCallback>,
    /// Someone joined
    pub on_join: Option<JoinCallback>,
    /// Someone left
    pub on_leave: Option<LeaveCallback>,
}

impl Default for PresenceOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            params: Params::new(),
            on_sync: None,
            on_join: None,
            on_leave: None,
        }
    }
}

impl PresenceOptions {
    /// Set the sync callback
    #[must_use]
    pub fn on_sync(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_sync = Some(Arc::new(f));
        self
    }

    /// Set the join callback
    #[must_use]
    pub fn on_join(
        mut self,
        f: impl Fn(&str, Option<&PresenceEntry>, &PresenceEntry) + Send + Sync + 'static,
    ) -> Self {
        self.on_join = Some(Arc::new(f));
        self
    }

    /// Set the leave callback
    #[must_use]
    pub fn on_leave(
        mut self,
        f: impl Fn(&str, &PresenceEntry, &PresenceEntry) + Send + Sync + 'static,
    ) -> Self {
        self.on_leave = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for PresenceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceOptions")
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// One present id in list form
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceListEntry {
    /// Present id
    pub id: String,
    /// Its metas, oldest first
    pub metas: Vec<Meta>,
}

#[derive(Default)]
struct Callbacks {
    on_sync: Option<SyncCallback>,
    on_join: Option<JoinCallback>,
    on_leave: Option<LeaveCallback>,
}

type ListCache = Option<(Arc<PresenceState>, Arc<Vec<PresenceListEntry>>)>;

struct PresenceShared {
    tracker: Mutex<PresenceTracker>,
    presences: RwLock<Arc<PresenceState>>,
    list_cache: Mutex<ListCache>,
    callbacks: RwLock<Callbacks>,
}

impl PresenceShared {
    fn new() -> Self {
        Self {
            tracker: Mutex::new(PresenceTracker::new()),
            presences: RwLock::new(Arc::new(PresenceState::new())),
            list_cache: Mutex::new(None),
            callbacks: RwLock::new(Callbacks::default()),
        }
    }

    fn reset(&self) {
        *self.tracker.lock() = PresenceTracker::new();
        *self.presences.write() = Arc::new(PresenceState::new());
    }

    /// Each acknowledged join is followed by a full state; hold diffs until then
    fn begin_join(&self) {
        self.tracker.lock().begin_join();
    }

    fn on_state(&self, payload: &Payload) -> Result<(), LiveError> {
        let state: PresenceState = serde_json::from_value(payload.clone())?;
        let (outcome, snapshot) = {
            let mut tracker = self.tracker.lock();
            let outcome = tracker.apply_state(state);
            (outcome, Arc::new(tracker.state().clone()))
        };
        trace!(present = snapshot.len(), "Presence state applied");
        self.publish(outcome.changes, snapshot);
        Ok(())
    }

    fn on_diff(&self, payload: &Payload) -> Result<(), LiveError> {
        let diff: PresenceDiff = serde_json::from_value(payload.clone())?;
        let (outcome, snapshot) = {
            let mut tracker = self.tracker.lock();
            let outcome = tracker.apply_diff(diff);
            (outcome, Arc::new(tracker.state().clone()))
        };
        if !outcome.synced {
            trace!("Presence diff buffered until state arrives");
            return Ok(());
        }
        self.publish(outcome.changes, snapshot);
        Ok(())
    }

    /// Store the new state, then notify with no lock held
    fn publish(&self, changes: Vec<PresenceChange>, snapshot: Arc<PresenceState>) {
        *self.presences.write() = snapshot;
        let (on_sync, on_join, on_leave) = {
            let callbacks = self.callbacks.read();
            (
                callbacks.on_sync.clone(),
                callbacks.on_join.clone(),
                callbacks.on_leave.clone(),
            )
        };
        for change in &changes {
            match change {
                PresenceChange::Join {
                    id,
                    current,
                    joined,
                } => {
                    if let Some(on_join) = &on_join {
                        on_join(id, current.as_ref(), joined);
                    }
                }
                PresenceChange::Leave { id, current, left } => {
                    if let Some(on_leave) = &on_leave {
                        on_leave(id, current, left);
                    }
                }
            }
        }
        if let Some(on_sync) = on_sync {
            on_sync();
        }
    }
}

/// Aggregated presence for one topic
pub struct PresenceSubscription {
    subscription: TopicSubscription,
    shared: Arc<PresenceShared>,
    current: Option<(String, Params)>,
}

impl PresenceSubscription {
    /// Presence aggregator on `connection`
    pub fn new(connection: Connection) -> Self {
        Self {
            subscription: TopicSubscription::new(connection),
            shared: Arc::new(PresenceShared::new()),
            current: None,
        }
    }

    /// Reconcile with the consumer's current inputs
    pub fn sync(&mut self, topic: Option<&str>, options: PresenceOptions) -> Result<(), LiveError> {
        *self.shared.callbacks.write() = Callbacks {
            on_sync: options.on_sync.clone(),
            on_join: options.on_join.clone(),
            on_leave: options.on_leave.clone(),
        };

        // Reject a bad topic before touching the state the old channel feeds
        let wanted = match topic {
            Some(topic) if options.enabled => {
                Some((Topic::new(topic)?.to_string(), options.params.clone()))
            }
            _ => None,
        };
        if wanted != self.current {
            self.shared.reset();
            self.current = wanted;
        }

        let state_shared = self.shared.clone();
        let diff_shared = self.shared.clone();
        let handlers = HandlerMap::new()
            .on(PRESENCE_STATE_EVENT, move |payload: &Payload| {
                state_shared.on_state(payload)
            })
            .on(PRESENCE_DIFF_EVENT, move |payload: &Payload| {
                diff_shared.on_diff(payload)
            });
        let join_shared = self.shared.clone();
        let subscription_options = SubscriptionOptions {
            enabled: options.enabled,
            params: options.params,
            on_join: Some(Arc::new(move |_: &Payload| join_shared.begin_join())),
            ..SubscriptionOptions::default()
        };
        self.subscription.sync(topic, handlers, subscription_options)?;
        Ok(())
    }

    /// Current presence state. The `Arc` changes identity on every update.
    pub fn presences(&self) -> Arc<PresenceState> {
        self.shared.presences.read().clone()
    }

    /// Presence as a list; recomputed only when the state changed
    pub fn list(&self) -> Arc<Vec<PresenceListEntry>> {
        let presences = self.presences();
        let mut cache = self.shared.list_cache.lock();
        if let Some((source, list)) = &*cache {
            if Arc::ptr_eq(source, &presences) {
                return list.clone();
            }
        }
        let list: Arc<Vec<PresenceListEntry>> = Arc::new(
            presences
                .iter()
                .map(|(id, entry)| PresenceListEntry {
                    id: id.clone(),
                    metas: entry.metas.clone(),
                })
                .collect(),
        );
        *cache = Some((presences, list.clone()));
        list
    }

    /// Metas for `id`, if present
    pub fn get_by_key(&self, id: &str) -> Option<Vec<Meta>> {
        self.presences().get(id).map(|entry| entry.metas.clone())
    }

    /// Phase of the underlying channel
    pub fn phase(&self) -> SubscriptionPhase {
        self.subscription.phase()
    }
}

impl fmt::Debug for PresenceSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceSubscription")
            .field("topic", &self.subscription.topic())
            .field("present", &self.presences().len())
            .finish()
    }
}
