//! Topic subscription
//!
//! A [`TopicSubscription`] binds one consumer to one channel on the shared
//! connection. The consumer calls [`TopicSubscription::sync`] on every pass
//! with its current topic, handlers and options:
//!
//! - the channel is created, joined and wired once per `(topic, params)`
//! - handler closures are swapped in place on each pass, so a late event
//!   always runs the most recent closure without re-subscribing
//! - disabling, switching topic or dropping the subscription leaves the
//!   channel; the connection itself stays open
//!
//! Every channel gets a generation number. Replies and events tagged with
//! an older generation are ignored.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use liveprops_core::{LiveError, Params, Payload, Topic};
use liveprops_transport::{
    ChannelTransport, Connection, EventHandler, JoinReply, ListenerRef, ReplyStatus,
    TransportResult,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Handlers keyed by event name
#[derive(Clone, Default)]
pub struct HandlerMap(IndexMap<String, EventHandler>);

impl HandlerMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `event`
    #[must_use]
    pub fn on(
        mut self,
        event: impl Into<String>,
        handler: impl Fn(&Payload) -> Result<(), LiveError> + Send + Sync + 'static,
    ) -> Self {
        self.0.insert(event.into(), Arc::new(handler));
        self
    }

    /// Add an already shared handler
    pub fn insert(&mut self, event: impl Into<String>, handler: EventHandler) {
        self.0.insert(event.into(), handler);
    }

    /// Handler for `event`
    pub fn get(&self, event: &str) -> Option<&EventHandler> {
        self.0.get(event)
    }

    /// Event names, in insertion order
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no handlers
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.events()).finish()
    }
}

/// Callback receiving a join reply payload
pub type ReplyCallback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Callback fired when the server closes the channel
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

/// Per-pass subscription options
#[derive(Clone)]
pub struct SubscriptionOptions {
    /// When false, no channel exists and any existing one is left
    pub enabled: bool,
    /// Join params
    pub params: Params,
    /// Join succeeded
    pub on_join: Option<ReplyCallback>,
    /// Join was rejected or timed out
    pub on_error: Option<ReplyCallback>,
    /// Server closed the channel
    pub on_close: Option<CloseCallback>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            params: Params::new(),
            on_join: None,
            on_error: None,
            on_close: None,
        }
    }
}

impl SubscriptionOptions {
    /// Options with `enabled` set
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Set join params
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set the join callback
    #[must_use]
    pub fn on_join(mut self, f: impl Fn(&Payload) + Send + Sync + 'static) -> Self {
        self.on_join = Some(Arc::new(f));
        self
    }

    /// Set the join failure callback
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&Payload) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Set the close callback
    #[must_use]
    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SubscriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionOptions")
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .field("on_join", &self.on_join.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Lifecycle of a subscription's current channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionPhase {
    /// No channel has been requested yet
    #[default]
    Idle,
    /// Join sent, no reply yet
    Joining,
    /// Join acknowledged
    Joined,
    /// Join rejected or timed out
    Errored,
    /// Channel left or closed
    Left,
}

/// The latest closures supplied by the consumer
#[derive(Default)]
struct Latest {
    handlers: HandlerMap,
    on_join: Option<ReplyCallback>,
    on_error: Option<ReplyCallback>,
    on_close: Option<CloseCallback>,
}

/// Shared, always-current view of the consumer's closures
#[derive(Clone, Default)]
struct HandlerCell(Arc<RwLock<Latest>>);

impl HandlerCell {
    fn replace(&self, handlers: HandlerMap, options: &SubscriptionOptions) {
        *self.0.write() = Latest {
            handlers,
            on_join: options.on_join.clone(),
            on_error: options.on_error.clone(),
            on_close: options.on_close.clone(),
        };
    }

    fn handler(&self, event: &str) -> Option<EventHandler> {
        self.0.read().handlers.get(event).cloned()
    }

    fn on_join(&self) -> Option<ReplyCallback> {
        self.0.read().on_join.clone()
    }

    fn on_error(&self) -> Option<ReplyCallback> {
        self.0.read().on_error.clone()
    }

    fn on_close(&self) -> Option<CloseCallback> {
        self.0.read().on_close.clone()
    }

    fn events(&self) -> Vec<String> {
        self.0.read().handlers.events().map(String::from).collect()
    }
}

/// Handle to a joined channel
#[derive(Clone)]
pub struct ChannelHandle {
    channel: Arc<dyn ChannelTransport>,
}

impl ChannelHandle {
    /// Topic of the channel
    pub fn topic(&self) -> &Topic {
        self.channel.topic()
    }

    /// Push an event to the server
    pub fn push(&self, event: &str, payload: Payload) -> TransportResult<()> {
        self.channel.push(event, payload)
    }

    /// Whether the channel is still joined
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.channel.is_joined()
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("topic", self.channel.topic())
            .field("joined", &self.channel.is_joined())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelKey {
    topic: Topic,
    params: Params,
}

struct ActiveChannel {
    key: ChannelKey,
    channel: Arc<dyn ChannelTransport>,
    generation: u64,
    routed: Vec<(String, ListenerRef)>,
}

#[derive(Default)]
struct Status {
    phase: SubscriptionPhase,
    generation: u64,
    joined: Option<ChannelHandle>,
    join_error: Option<LiveError>,
}

type SharedStatus = Arc<Mutex<Status>>;

fn is_current(status: &SharedStatus, generation: u64) -> bool {
    status.lock().generation == generation
}

/// One consumer's subscription to a topic
pub struct TopicSubscription {
    connection: Connection,
    latest: HandlerCell,
    status: SharedStatus,
    active: Option<ActiveChannel>,
}

impl TopicSubscription {
    /// Subscription on `connection`; no channel until the first enabled sync
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            latest: HandlerCell::default(),
            status: SharedStatus::default(),
            active: None,
        }
    }

    /// Reconcile with the consumer's current inputs.
    ///
    /// Returns the joined channel, or `None` while joining, disabled or
    /// without a topic.
    pub fn sync(
        &mut self,
        topic: Option<&str>,
        handlers: HandlerMap,
        options: SubscriptionOptions,
    ) -> Result<Option<ChannelHandle>, LiveError> {
        self.latest.replace(handlers, &options);

        let wanted = match topic {
            Some(topic) if options.enabled => Some(ChannelKey {
                topic: Topic::new(topic)?,
                params: options.params,
            }),
            _ => None,
        };

        let unchanged = match (&self.active, &wanted) {
            (Some(active), Some(wanted)) => active.key == *wanted,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            self.reroute();
        } else {
            self.teardown();
            if let Some(key) = wanted {
                self.start(key)?;
            }
        }
        Ok(self.channel())
    }

    /// The joined channel, if any
    pub fn channel(&self) -> Option<ChannelHandle> {
        self.status.lock().joined.clone()
    }

    /// Current phase
    pub fn phase(&self) -> SubscriptionPhase {
        self.status.lock().phase
    }

    /// Why the current channel failed to join, while `Errored`
    pub fn join_error(&self) -> Option<LiveError> {
        self.status.lock().join_error.clone()
    }

    /// Topic of the current channel, if any
    pub fn topic(&self) -> Option<&Topic> {
        self.active.as_ref().map(|active| &active.key.topic)
    }

    /// The connection this subscription uses
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Leave the current channel, if any
    pub fn leave(&mut self) {
        self.teardown();
    }

    fn start(&mut self, key: ChannelKey) -> Result<(), LiveError> {
        self.connection.connect()?;

        let channel = self.connection.channel(&key.topic, &key.params);
        let generation = {
            let mut status = self.status.lock();
            status.generation += 1;
            status.phase = SubscriptionPhase::Joining;
            status.joined = None;
            status.join_error = None;
            status.generation
        };
        info!(topic = %key.topic, generation, "Joining channel");

        let routed = self
            .latest
            .events()
            .into_iter()
            .map(|event| {
                let listener = channel.on(&event, self.route(event.clone(), generation));
                (event, listener)
            })
            .collect();
        channel.on_close(self.close_callback(key.topic.clone(), generation));

        let topic = key.topic.clone();
        self.active = Some(ActiveChannel {
            key,
            channel: channel.clone(),
            generation,
            routed,
        });
        channel.join(self.reply_callback(topic, channel.clone(), generation));
        Ok(())
    }

    /// Match the channel's listeners to the latest handler keys
    fn reroute(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let events = self.latest.events();
        let fresh: Vec<String> = events
            .iter()
            .filter(|event| !active.routed.iter().any(|(routed, _)| routed == *event))
            .cloned()
            .collect();
        let stale: Vec<(String, ListenerRef)> = active
            .routed
            .iter()
            .filter(|(routed, _)| !events.contains(routed))
            .cloned()
            .collect();
        if fresh.is_empty() && stale.is_empty() {
            return;
        }

        let (channel, generation) = (active.channel.clone(), active.generation);
        for (event, listener) in &stale {
            debug!(topic = %channel.topic(), event = %event, "Dropping route");
            channel.off(event, *listener);
        }
        let mut added = Vec::with_capacity(fresh.len());
        for event in fresh {
            debug!(topic = %channel.topic(), event = %event, "Routing new event");
            let listener = channel.on(&event, self.route(event.clone(), generation));
            added.push((event, listener));
        }
        if let Some(active) = &mut self.active {
            active
                .routed
                .retain(|(event, _)| !stale.iter().any(|(gone, _)| gone == event));
            active.routed.extend(added);
        }
    }

    /// Forward `event` to whichever handler is current when it fires
    fn route(&self, event: String, generation: u64) -> EventHandler {
        let latest = self.latest.clone();
        let status = self.status.clone();
        Arc::new(move |payload: &Payload| {
            if !is_current(&status, generation) {
                return Ok(());
            }
            match latest.handler(&event) {
                Some(handler) => handler(payload),
                None => Ok(()),
            }
        })
    }

    fn reply_callback(
        &self,
        topic: Topic,
        channel: Arc<dyn ChannelTransport>,
        generation: u64,
    ) -> Box<dyn FnOnce(JoinReply) + Send> {
        let latest = self.latest.clone();
        let status = self.status.clone();
        Box::new(move |reply: JoinReply| {
            {
                let mut status = status.lock();
                if status.generation != generation {
                    debug!(topic = %topic, "Ignoring reply for a stale channel");
                    return;
                }
                match reply.status {
                    ReplyStatus::Ok => {
                        status.phase = SubscriptionPhase::Joined;
                        status.joined = Some(ChannelHandle { channel });
                    }
                    ReplyStatus::Error => {
                        status.phase = SubscriptionPhase::Errored;
                        status.join_error = Some(LiveError::JoinRejected {
                            topic: topic.to_string(),
                            reply: reply.response.to_string(),
                        });
                    }
                    ReplyStatus::Timeout => {
                        status.phase = SubscriptionPhase::Errored;
                        status.join_error =
                            Some(LiveError::transport(format!("join '{topic}' timed out")));
                    }
                }
            }
            match reply.status {
                ReplyStatus::Ok => {
                    info!(topic = %topic, "Joined channel");
                    if let Some(on_join) = latest.on_join() {
                        on_join(&reply.response);
                    }
                }
                ReplyStatus::Error | ReplyStatus::Timeout => {
                    error!(topic = %topic, status = ?reply.status, reply = %reply.response, "Unable to join channel");
                    if let Some(on_error) = latest.on_error() {
                        on_error(&reply.response);
                    }
                }
            }
        })
    }

    fn close_callback(&self, topic: Topic, generation: u64) -> Arc<dyn Fn() + Send + Sync> {
        let latest = self.latest.clone();
        let status = self.status.clone();
        Arc::new(move || {
            {
                let mut status = status.lock();
                if status.generation != generation {
                    return;
                }
                status.phase = SubscriptionPhase::Left;
                status.joined = None;
            }
            warn!(topic = %topic, "Channel closed by server");
            if let Some(on_close) = latest.on_close() {
                on_close();
            }
        })
    }

    fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        {
            let mut status = self.status.lock();
            status.generation += 1;
            status.phase = SubscriptionPhase::Left;
            status.joined = None;
        }
        info!(topic = %active.key.topic, "Leaving channel");
        active.channel.leave();
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("topic", &self.topic())
            .field("phase", &self.phase())
            .finish()
    }
}
