//! Shared connection manager
//!
//! A host creates one [`Connection`] for its whole lifetime and hands clones
//! to every topic subscription and presence aggregator. Creating it is pure
//! configuration; nothing touches the network until [`Connection::connect`].
//! Subscriptions only ever open the connection, never close it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use liveprops_core::{Params, Topic};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::TransportResult;
use crate::logger::{SafeLogger, TransportLogger};
use crate::params::ParamsSource;
use crate::reconnect::ReconnectPolicy;
use crate::traits::{
    ChannelTransport, ConnectRequest, SocketTransport, StateReporter, TransportSettings,
    TransportState,
};

/// Connection knobs
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Params resolved on every connection attempt
    pub params: ParamsSource,
    /// Optional host logger; `None` logs nothing
    pub logger: Option<Arc<dyn TransportLogger>>,
    /// Passed through to the transport
    pub reconnect: ReconnectPolicy,
    /// Passed through to the transport
    pub heartbeat_interval: Duration,
    /// Passed through to the transport
    pub timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        let settings = TransportSettings::default();
        Self {
            params: ParamsSource::default(),
            logger: None,
            reconnect: settings.reconnect,
            heartbeat_interval: settings.heartbeat_interval,
            timeout: settings.timeout,
        }
    }
}

impl ConnectionOptions {
    /// Set the params source
    #[must_use]
    pub fn with_params(mut self, params: impl Into<ParamsSource>) -> Self {
        self.params = params.into();
        self
    }

    /// Install a host logger
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn TransportLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the reconnect policy
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the heartbeat interval
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    fn settings(&self) -> TransportSettings {
        TransportSettings {
            reconnect: self.reconnect.clone(),
            heartbeat_interval: self.heartbeat_interval,
            timeout: self.timeout,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("params", &self.params)
            .field("logger", &self.logger.is_some())
            .field("reconnect", &self.reconnect)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

struct ConnectionInner {
    endpoint: String,
    options: ConnectionOptions,
    logger: SafeLogger,
    transport: Arc<dyn SocketTransport>,
    state_tx: Arc<watch::Sender<TransportState>>,
}

/// Handle to the one persistent connection of a host
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Configure a connection to `endpoint` over `transport`. Performs no I/O.
pub fn create_connection(
    endpoint: impl Into<String>,
    options: ConnectionOptions,
    transport: Arc<dyn SocketTransport>,
) -> Connection {
    let (state_tx, _) = watch::channel(TransportState::Closed);
    let logger = SafeLogger::new(options.logger.clone());
    Connection {
        inner: Arc::new(ConnectionInner {
            endpoint: endpoint.into(),
            options,
            logger,
            transport,
            state_tx: Arc::new(state_tx),
        }),
    }
}

impl Connection {
    /// Endpoint this connection dials
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Options the connection was created with
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Current transport state
    pub fn state(&self) -> TransportState {
        self.inner.transport.state()
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Subscribe to transport state changes
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.inner.state_tx.subscribe()
    }

    /// Open the connection. No-op while already open or connecting.
    ///
    /// Params are resolved here, once per attempt, so dynamic sources see the
    /// token that is current at connect time.
    pub fn connect(&self) -> TransportResult<()> {
        let state = self.state();
        if state.is_active() {
            debug!(endpoint = %self.inner.endpoint, state = %state, "Connect skipped");
            return Ok(());
        }

        let request = ConnectRequest {
            endpoint: self.inner.endpoint.clone(),
            params: self.inner.options.params.resolve(),
            settings: self.inner.options.settings(),
            reporter: StateReporter::new(self.inner.state_tx.clone()),
            logger: self.inner.logger.clone(),
        };
        info!(
            endpoint = %self.inner.endpoint,
            transport = self.inner.transport.transport_type(),
            "Opening connection"
        );
        self.inner.transport.connect(request)
    }

    /// Close the connection. Reserved for the host; subscriptions never call it.
    pub fn disconnect(&self) {
        info!(endpoint = %self.inner.endpoint, "Closing connection");
        self.inner.transport.disconnect();
    }

    /// Create a channel for `topic` on this connection
    pub fn channel(&self, topic: &Topic, params: &Params) -> Arc<dyn ChannelTransport> {
        self.inner.transport.channel(topic, params)
    }

    /// The logger shared with the transport
    pub fn logger(&self) -> &SafeLogger {
        &self.inner.logger
    }

    /// Whether both handles point at the same connection
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .field("transport", &self.inner.transport.transport_type())
            .finish()
    }
}
