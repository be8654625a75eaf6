//! Core transport trait definitions
//!
//! liveprops rides an external channel transport. Anything that can open a
//! socket, multiplex topics over it and deliver named events can be plugged
//! in by implementing [`SocketTransport`] and [`ChannelTransport`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use liveprops_core::{LiveError, Params, Payload, Topic};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::TransportResult;
use crate::logger::SafeLogger;
use crate::reconnect::ReconnectPolicy;

/// Socket-level state as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Not connected and not trying
    #[default]
    Closed,
    /// Dialing, or waiting for the next reconnect attempt
    Connecting,
    /// Connected
    Open,
}

impl TransportState {
    /// Whether `connect()` would be a no-op in this state
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Status of a server reply to a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Join accepted
    Ok,
    /// Join rejected by the server
    Error,
    /// No reply within the transport timeout
    Timeout,
}

/// Server reply to a channel join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReply {
    /// Reply status
    pub status: ReplyStatus,
    /// Reply body
    pub response: Payload,
}

impl JoinReply {
    /// Successful reply
    pub fn ok(response: Payload) -> Self {
        Self {
            status: ReplyStatus::Ok,
            response,
        }
    }

    /// Rejected reply
    pub fn error(response: Payload) -> Self {
        Self {
            status: ReplyStatus::Error,
            response,
        }
    }

    /// Timed-out reply
    pub fn timeout() -> Self {
        Self {
            status: ReplyStatus::Timeout,
            response: Payload::Null,
        }
    }
}

/// Handler for a named inbound event.
///
/// Errors are returned to whoever delivered the event; the transport decides
/// how to surface them.
pub type EventHandler = Arc<dyn Fn(&Payload) -> Result<(), LiveError> + Send + Sync>;

/// Callback for the join reply
pub type JoinReplyHandler = Box<dyn FnOnce(JoinReply) + Send>;

/// Callback for channel close
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Identifies one registered listener so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerRef(pub u64);

/// Settings forwarded verbatim to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSettings {
    /// Delay schedule between reconnect attempts
    pub reconnect: ReconnectPolicy,
    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
    /// Push/join reply timeout
    pub timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_millis(30_000),
            timeout: Duration::from_millis(10_000),
        }
    }
}

/// Publishes socket state changes back to the owning connection
#[derive(Clone)]
pub struct StateReporter {
    sender: Arc<watch::Sender<TransportState>>,
}

impl StateReporter {
    pub(crate) fn new(sender: Arc<watch::Sender<TransportState>>) -> Self {
        Self { sender }
    }

    /// Report a new socket state. Unchanged states do not wake watchers.
    pub fn report(&self, state: TransportState) {
        self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

impl fmt::Debug for StateReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateReporter")
            .field("state", &*self.sender.borrow())
            .finish()
    }
}

/// Everything a transport needs for one connection attempt
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Endpoint path or URL
    pub endpoint: String,
    /// Params resolved for this attempt
    pub params: Params,
    /// Reconnect and heartbeat settings
    pub settings: TransportSettings,
    /// Sink for state changes
    pub reporter: StateReporter,
    /// Host-provided logger (may be a no-op)
    pub logger: SafeLogger,
}

/// A socket that multiplexes topic channels
pub trait SocketTransport: Send + Sync {
    /// Current socket state
    fn state(&self) -> TransportState;

    /// Open the socket. Retries after failure are the transport's business.
    fn connect(&self, request: ConnectRequest) -> TransportResult<()>;

    /// Close the socket
    fn disconnect(&self);

    /// Create a channel for `topic`. Creating does not join.
    fn channel(&self, topic: &Topic, params: &Params) -> Arc<dyn ChannelTransport>;

    /// Get transport type identifier
    fn transport_type(&self) -> &'static str;
}

/// One topic channel on a socket
pub trait ChannelTransport: Send + Sync {
    /// Topic this channel is bound to
    fn topic(&self) -> &Topic;

    /// Register a listener for `event`
    fn on(&self, event: &str, handler: EventHandler) -> ListenerRef;

    /// Remove a listener registered with [`ChannelTransport::on`]
    fn off(&self, event: &str, listener: ListenerRef);

    /// Join the topic; `on_reply` fires once with the server's answer
    fn join(&self, on_reply: JoinReplyHandler);

    /// Register a close callback
    fn on_close(&self, handler: CloseHandler);

    /// Leave the topic. Events delivered afterwards are dropped.
    fn leave(&self);

    /// Push a client-originated event
    fn push(&self, event: &str, payload: Payload) -> TransportResult<()>;

    /// Whether the join has been acknowledged and the channel not left
    fn is_joined(&self) -> bool;
}
