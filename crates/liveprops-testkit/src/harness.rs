//! In-memory wiring of transport, connection and navigation host

use std::sync::Arc;

use liveprops_app::{
    DeclarativeChannelProps, MemoryNavigator, NavigationHost, OptimisticProps,
    PresenceSubscription, TopicSubscription,
};
use liveprops_core::PropsMap;
use liveprops_transport::{
    create_connection, Connection, ConnectionOptions, JoinPolicy, MemoryTransport, TracingLogger,
};

/// Endpoint used by every harness connection
pub const TEST_ENDPOINT: &str = "/socket";

/// One host: a memory transport, its connection and a memory navigator
#[derive(Clone)]
pub struct Harness {
    /// Server side of the socket
    pub transport: MemoryTransport,
    /// The shared connection
    pub connection: Connection,
    /// The navigation host
    pub navigator: MemoryNavigator,
}

impl Harness {
    /// Harness auto-accepting joins, showing `initial` props
    pub fn new(initial: PropsMap) -> Self {
        Self::with_join_policy(initial, JoinPolicy::Accept)
    }

    /// Harness with an explicit join policy. Transport log lines go to
    /// `tracing`.
    pub fn with_join_policy(initial: PropsMap, policy: JoinPolicy) -> Self {
        let options = ConnectionOptions::default().with_logger(Arc::new(TracingLogger));
        Self::with_options(initial, policy, options)
    }

    /// Harness with explicit join policy and connection options
    pub fn with_options(initial: PropsMap, policy: JoinPolicy, options: ConnectionOptions) -> Self {
        let transport = MemoryTransport::with_join_policy(policy);
        let connection = create_connection(TEST_ENDPOINT, options, Arc::new(transport.clone()));
        Self {
            transport,
            connection,
            navigator: MemoryNavigator::new(initial),
        }
    }

    /// The navigator as a host trait object
    pub fn host(&self) -> Arc<dyn NavigationHost> {
        Arc::new(self.navigator.clone())
    }

    /// A fresh optimistic store over the navigator
    pub fn store(&self) -> OptimisticProps {
        OptimisticProps::new(self.host())
    }

    /// A fresh topic subscription on the connection
    pub fn subscription(&self) -> TopicSubscription {
        TopicSubscription::new(self.connection.clone())
    }

    /// A fresh presence aggregator on the connection
    pub fn presence(&self) -> PresenceSubscription {
        PresenceSubscription::new(self.connection.clone())
    }

    /// A fresh declarative consumer with its own store
    pub fn channel_props(&self) -> DeclarativeChannelProps {
        DeclarativeChannelProps::new(self.connection.clone(), self.host())
    }
}
