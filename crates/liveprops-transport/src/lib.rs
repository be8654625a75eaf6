//! # liveprops-transport
//!
//! The connection side of liveprops. This crate does not speak a wire protocol
//! itself; it defines the seams an external channel transport plugs into and
//! the client logic that sits directly on top of them:
//!
//! - [`SocketTransport`] / [`ChannelTransport`]: the transport interface
//! - [`Connection`]: the shared connection manager (per-attempt auth params,
//!   reconnect and heartbeat knobs, idempotent connect)
//! - [`ParamsSource`] and the CSRF token sources used for connect params
//! - [`PresenceTracker`]: presence state/diff reconciliation keyed by `phx_ref`
//! - [`ConnectionConfig`]: TOML-loadable connection settings
//! - [`MemoryTransport`]: an in-process transport for tests and headless hosts

pub mod config;
pub mod connection;
pub mod error;
pub mod logger;
pub mod memory;
pub mod params;
pub mod presence;
pub mod reconnect;
pub mod traits;

pub use config::{ConnectionConfig, ReconnectConfig};
pub use connection::{create_connection, Connection, ConnectionOptions};
pub use error::{ConfigError, TransportError, TransportResult};
pub use logger::{LoggerError, SafeLogger, TracingLogger, TransportLogger};
pub use memory::{JoinPolicy, MemoryChannel, MemoryTransport, PushedMessage};
pub use params::{
    csrf_params, CsrfTokenSource, MetaTagTokenSource, ParamsSource, StaticToken, CSRF_PARAM,
};
pub use presence::{
    sync_diff, sync_state, Meta, PresenceChange, PresenceDiff, PresenceEntry, PresenceState,
    PresenceTracker, TrackerOutcome, PRESENCE_DIFF_EVENT, PRESENCE_STATE_EVENT,
};
pub use reconnect::ReconnectPolicy;
pub use traits::{
    ChannelTransport, CloseHandler, ConnectRequest, EventHandler, JoinReply, JoinReplyHandler,
    ListenerRef, ReplyStatus, SocketTransport, StateReporter, TransportSettings, TransportState,
};
