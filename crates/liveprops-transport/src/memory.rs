//! Unified in-memory transport implementation
//!
//! Plays both ends of the wire inside one process. The client half
//! implements [`SocketTransport`] / [`ChannelTransport`]; the server half is
//! a set of inherent methods ([`MemoryTransport::emit`],
//! [`MemoryTransport::reply_join`], [`MemoryTransport::close_channel`], ...)
//! that tests and headless hosts drive directly.
//!
//! No callback is invoked while an internal lock is held, so handlers are
//! free to call back into the transport.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use liveprops_core::{LiveError, Params, Payload, Topic};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, trace};

use crate::error::{TransportError, TransportResult};
use crate::logger::SafeLogger;
use crate::traits::{
    ChannelTransport, CloseHandler, ConnectRequest, EventHandler, JoinReply, JoinReplyHandler,
    ListenerRef, ReplyStatus, SocketTransport, StateReporter, TransportSettings, TransportState,
};

/// How the simulated server answers joins
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JoinPolicy {
    /// Reply `ok` with the given response as soon as the socket is open
    #[default]
    Accept,
    /// Hold joins until [`MemoryTransport::reply_join`] is called
    Manual,
    /// Reply `error` with the given response
    Reject(Payload),
}

/// A client push recorded by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct PushedMessage {
    /// Channel topic
    pub topic: Topic,
    /// Event name
    pub event: String,
    /// Event body
    pub payload: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryPhase {
    Created,
    Joining,
    Joined,
    Errored,
    Left,
    Closed,
}

struct Listener {
    event: String,
    listener: ListenerRef,
    handler: EventHandler,
}

struct ChannelState {
    phase: MemoryPhase,
    listeners: Vec<Listener>,
    close_handlers: Vec<CloseHandler>,
    pending_join: Option<JoinReplyHandler>,
}

impl ChannelState {
    fn is_released(&self) -> bool {
        matches!(self.phase, MemoryPhase::Left | MemoryPhase::Closed)
    }

    /// Move to `phase` and hand back every registered callback. The caller
    /// drops them once the lock is released.
    fn release(&mut self, phase: MemoryPhase) -> Released {
        self.phase = phase;
        Released {
            listeners: mem::take(&mut self.listeners),
            close_handlers: mem::take(&mut self.close_handlers),
            pending_join: self.pending_join.take(),
        }
    }
}

/// Callbacks detached from a released channel
struct Released {
    listeners: Vec<Listener>,
    close_handlers: Vec<CloseHandler>,
    pending_join: Option<JoinReplyHandler>,
}

impl Released {
    fn count(&self) -> usize {
        self.listeners.len() + self.close_handlers.len() + usize::from(self.pending_join.is_some())
    }
}

/// Client half of one in-memory channel
pub struct MemoryChannel {
    id: u64,
    topic: Topic,
    params: Params,
    transport: Weak<MemoryInner>,
    state: Mutex<ChannelState>,
}

impl MemoryChannel {
    /// Join params the channel was created with
    pub fn params(&self) -> &Params {
        &self.params
    }

    fn phase(&self) -> MemoryPhase {
        self.state.lock().phase
    }

    fn is_live(&self) -> bool {
        matches!(
            self.phase(),
            MemoryPhase::Created | MemoryPhase::Joining | MemoryPhase::Joined
        )
    }

    fn handlers_for(&self, event: &str) -> Vec<EventHandler> {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|l| l.event == event)
            .map(|l| l.handler.clone())
            .collect()
    }

    /// Resolve a pending join. Returns the reply handler to invoke, if any.
    fn settle_join(&self, reply: &JoinReply) -> Option<JoinReplyHandler> {
        let mut state = self.state.lock();
        if state.phase != MemoryPhase::Joining {
            return None;
        }
        let handler = state.pending_join.take()?;
        state.phase = if reply.status == ReplyStatus::Ok {
            MemoryPhase::Joined
        } else {
            MemoryPhase::Errored
        };
        Some(handler)
    }
}

impl ChannelTransport for MemoryChannel {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn on(&self, event: &str, handler: EventHandler) -> ListenerRef {
        let listener = ListenerRef(
            self.transport
                .upgrade()
                .map_or(0, |inner| inner.next_ref.fetch_add(1, Ordering::Relaxed)),
        );
        let mut state = self.state.lock();
        if !state.is_released() {
            state.listeners.push(Listener {
                event: event.to_string(),
                listener,
                handler,
            });
        }
        listener
    }

    fn off(&self, event: &str, listener: ListenerRef) {
        self.state
            .lock()
            .listeners
            .retain(|l| !(l.event == event && l.listener == listener));
    }

    fn join(&self, on_reply: JoinReplyHandler) {
        {
            let mut state = self.state.lock();
            if state.is_released() {
                return;
            }
            state.phase = MemoryPhase::Joining;
            state.pending_join = Some(on_reply);
        }
        if let Some(inner) = self.transport.upgrade() {
            inner.process_joins();
        }
    }

    fn on_close(&self, handler: CloseHandler) {
        let mut state = self.state.lock();
        if !state.is_released() {
            state.close_handlers.push(handler);
        }
    }

    fn leave(&self) {
        let released = {
            let mut state = self.state.lock();
            if state.is_released() {
                return;
            }
            state.release(MemoryPhase::Left)
        };
        debug!(
            topic = %self.topic,
            channel = self.id,
            released = released.count(),
            "Memory channel left"
        );
        drop(released);
        if let Some(inner) = self.transport.upgrade() {
            inner.prune();
        }
    }

    fn push(&self, event: &str, payload: Payload) -> TransportResult<()> {
        match self.phase() {
            MemoryPhase::Joined => {}
            MemoryPhase::Left | MemoryPhase::Closed => {
                return Err(TransportError::ChannelClosed {
                    topic: self.topic.to_string(),
                })
            }
            _ => {
                return Err(TransportError::NotJoined {
                    topic: self.topic.to_string(),
                })
            }
        }
        let inner = self.transport.upgrade().ok_or_else(|| TransportError::ChannelClosed {
            topic: self.topic.to_string(),
        })?;
        inner.logger().log(
            "push",
            &format!("{} {}", self.topic, event),
            &payload,
        );
        inner.pushes.lock().push(PushedMessage {
            topic: self.topic.clone(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.phase() == MemoryPhase::Joined
    }
}

struct SocketState {
    state: TransportState,
    reachable: bool,
    connect_attempts: u32,
    retry_delays: Vec<std::time::Duration>,
    last_request: Option<ConnectRequest>,
}

struct MemoryInner {
    socket: Mutex<SocketState>,
    channels: Mutex<Vec<Arc<MemoryChannel>>>,
    created: Mutex<HashMap<String, usize>>,
    join_policy: Mutex<JoinPolicy>,
    pushes: Mutex<Vec<PushedMessage>>,
    next_ref: AtomicU64,
}

impl MemoryInner {
    fn logger(&self) -> SafeLogger {
        self.socket
            .lock()
            .last_request
            .as_ref()
            .map(|request| request.logger.clone())
            .unwrap_or_default()
    }

    fn reporter(&self) -> Option<StateReporter> {
        self.socket
            .lock()
            .last_request
            .as_ref()
            .map(|request| request.reporter.clone())
    }

    fn set_state(&self, state: TransportState) {
        self.socket.lock().state = state;
        if let Some(reporter) = self.reporter() {
            reporter.report(state);
        }
    }

    /// Forget channels that were left or closed
    fn prune(&self) {
        self.channels.lock().retain(|channel| !channel.state.lock().is_released());
    }

    fn live_channels(&self) -> Vec<Arc<MemoryChannel>> {
        self.channels
            .lock()
            .iter()
            .filter(|channel| channel.is_live())
            .cloned()
            .collect()
    }

    /// Answer pending joins according to the join policy, once the socket is open
    fn process_joins(&self) {
        if self.socket.lock().state != TransportState::Open {
            return;
        }
        let reply = match &*self.join_policy.lock() {
            JoinPolicy::Accept => JoinReply::ok(json!({})),
            JoinPolicy::Reject(response) => JoinReply::error(response.clone()),
            JoinPolicy::Manual => return,
        };
        let settled: Vec<(Topic, JoinReplyHandler)> = self
            .live_channels()
            .iter()
            .filter_map(|channel| {
                channel
                    .settle_join(&reply)
                    .map(|handler| (channel.topic.clone(), handler))
            })
            .collect();
        for (topic, handler) in settled {
            trace!(topic = %topic, status = ?reply.status, "Memory join settled");
            handler(reply.clone());
        }
    }
}

/// In-memory transport for testing and local communication
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Create a new memory transport that accepts every join
    pub fn new() -> Self {
        Self::with_join_policy(JoinPolicy::Accept)
    }

    /// Create a memory transport with a specific join policy
    pub fn with_join_policy(policy: JoinPolicy) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                socket: Mutex::new(SocketState {
                    state: TransportState::Closed,
                    reachable: true,
                    connect_attempts: 0,
                    retry_delays: Vec::new(),
                    last_request: None,
                }),
                channels: Mutex::new(Vec::new()),
                created: Mutex::new(HashMap::new()),
                join_policy: Mutex::new(policy),
                pushes: Mutex::new(Vec::new()),
                next_ref: AtomicU64::new(1),
            }),
        }
    }

    // ─── Server controls ─────────────────────────────────────

    /// Change how future joins are answered
    pub fn set_join_policy(&self, policy: JoinPolicy) {
        *self.inner.join_policy.lock() = policy;
        self.inner.process_joins();
    }

    /// Make the endpoint (un)reachable. Becoming reachable completes a
    /// pending connection attempt.
    pub fn set_reachable(&self, reachable: bool) {
        let complete = {
            let mut socket = self.inner.socket.lock();
            socket.reachable = reachable;
            reachable && socket.state == TransportState::Connecting
        };
        if complete {
            self.inner.set_state(TransportState::Open);
            self.inner.process_joins();
        }
    }

    /// Answer every pending join on `topic`. Returns how many were answered.
    pub fn reply_join(&self, topic: &str, reply: JoinReply) -> usize {
        let handlers: Vec<JoinReplyHandler> = self
            .live_channels(topic)
            .iter()
            .filter_map(|channel| channel.settle_join(&reply))
            .collect();
        let answered = handlers.len();
        for handler in handlers {
            handler(reply.clone());
        }
        answered
    }

    /// Deliver `event` to every joined channel on `topic`.
    ///
    /// Returns the number of handlers invoked. The first handler error stops
    /// delivery and is returned to the caller.
    pub fn emit(&self, topic: &str, event: &str, payload: Payload) -> Result<usize, LiveError> {
        let channels: Vec<Arc<MemoryChannel>> = self
            .live_channels(topic)
            .into_iter()
            .filter(|channel| channel.phase() == MemoryPhase::Joined)
            .collect();
        self.inner
            .logger()
            .log("receive", &format!("{topic} {event}"), &payload);

        let mut invoked = 0;
        for channel in channels {
            for handler in channel.handlers_for(event) {
                // A handler earlier in this loop may have left the channel
                if channel.phase() != MemoryPhase::Joined {
                    break;
                }
                handler(&payload)?;
                invoked += 1;
            }
        }
        Ok(invoked)
    }

    /// Close every live channel on `topic`, firing their close callbacks
    pub fn close_channel(&self, topic: &str) -> usize {
        let channels = self.live_channels(topic);
        let released: Vec<Released> = channels
            .iter()
            .map(|channel| channel.state.lock().release(MemoryPhase::Closed))
            .collect();
        self.inner.prune();
        for callback in released.iter().flat_map(|r| r.close_handlers.iter()) {
            callback();
        }
        channels.len()
    }

    // ─── Inspection ──────────────────────────────────────────

    /// Number of `connect` calls that reached the transport
    pub fn connect_attempts(&self) -> u32 {
        self.inner.socket.lock().connect_attempts
    }

    /// Params of the most recent connection attempt
    pub fn last_params(&self) -> Option<Params> {
        self.inner
            .socket
            .lock()
            .last_request
            .as_ref()
            .map(|request| request.params.clone())
    }

    /// Settings of the most recent connection attempt
    pub fn last_settings(&self) -> Option<TransportSettings> {
        self.inner
            .socket
            .lock()
            .last_request
            .as_ref()
            .map(|request| request.settings.clone())
    }

    /// Reconnect delays requested from the policy while unreachable
    pub fn retry_delays(&self) -> Vec<std::time::Duration> {
        self.inner.socket.lock().retry_delays.clone()
    }

    /// Channels created for `topic` over the transport's lifetime
    pub fn channels_created(&self, topic: &str) -> usize {
        self.inner
            .created
            .lock()
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Channels the transport still holds on to, across all topics
    pub fn retained_channels(&self) -> usize {
        self.inner.channels.lock().len()
    }

    /// Channels on `topic` that have not been left or closed
    pub fn active_channels(&self, topic: &str) -> usize {
        self.live_channels(topic).len()
    }

    /// Channels on `topic` whose join has been acknowledged
    pub fn joined_channels(&self, topic: &str) -> usize {
        self.live_channels(topic)
            .iter()
            .filter(|channel| channel.phase() == MemoryPhase::Joined)
            .count()
    }

    /// Client pushes recorded so far
    pub fn pushes(&self) -> Vec<PushedMessage> {
        self.inner.pushes.lock().clone()
    }

    fn live_channels(&self, topic: &str) -> Vec<Arc<MemoryChannel>> {
        self.inner
            .channels
            .lock()
            .iter()
            .filter(|channel| channel.topic.as_str() == topic && channel.is_live())
            .cloned()
            .collect()
    }
}

impl SocketTransport for MemoryTransport {
    fn state(&self) -> TransportState {
        self.inner.socket.lock().state
    }

    fn connect(&self, request: ConnectRequest) -> TransportResult<()> {
        let (reachable, attempt, delay) = {
            let mut socket = self.inner.socket.lock();
            socket.connect_attempts += 1;
            let attempt = socket.connect_attempts;
            let delay = request.settings.reconnect.delay_for(attempt);
            if !socket.reachable {
                socket.retry_delays.push(delay);
            }
            socket.last_request = Some(request.clone());
            (socket.reachable, attempt, delay)
        };

        request.reporter.report(TransportState::Connecting);
        self.inner.socket.lock().state = TransportState::Connecting;

        if !reachable {
            request.logger.log(
                "transport",
                &format!("{} unreachable, retrying in {}ms", request.endpoint, delay.as_millis()),
                &json!({ "attempt": attempt }),
            );
            return Ok(());
        }

        request
            .logger
            .log("transport", &format!("connected to {}", request.endpoint), &json!({}));
        self.inner.set_state(TransportState::Open);
        self.inner.process_joins();
        Ok(())
    }

    fn disconnect(&self) {
        self.inner.set_state(TransportState::Closed);
    }

    fn channel(&self, topic: &Topic, params: &Params) -> Arc<dyn ChannelTransport> {
        let id = self.inner.next_ref.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(MemoryChannel {
            id,
            topic: topic.clone(),
            params: params.clone(),
            transport: Arc::downgrade(&self.inner),
            state: Mutex::new(ChannelState {
                phase: MemoryPhase::Created,
                listeners: Vec::new(),
                close_handlers: Vec::new(),
                pending_join: None,
            }),
        });
        self.inner.channels.lock().push(channel.clone());
        *self.inner.created.lock().entry(topic.to_string()).or_default() += 1;
        debug!(topic = %topic, channel = id, "Memory channel created");
        channel
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}
