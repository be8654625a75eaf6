//! # liveprops-app
//!
//! Consumer-facing state sync built on [`liveprops_transport`]:
//!
//! - [`OptimisticProps`]: local writes layered over the navigation host's
//!   authoritative props, dropped whenever a new snapshot arrives
//! - [`TopicSubscription`]: one consumer's channel on the shared connection
//! - [`PresenceSubscription`]: who is on a topic, as a map or a list
//! - [`DeclarativeChannelProps`]: channel events mapped onto optimistic
//!   writes through [`Strategy`] configs or callbacks
//! - [`InterceptorRegistry`]: the process-wide CSRF request interceptor
//!
//! Consumers are plain owned values. Calling `sync` on every render pass
//! reconciles them with the latest inputs; dropping one tears it down.

pub mod dispatcher;
pub mod error;
pub mod interceptor;
pub mod navigation;
pub mod optimistic;
pub mod presence;
pub mod subscription;

pub use dispatcher::{
    apply_strategy, build_handlers, DeclarativeChannelProps, DispatchContext, EventCallback,
    EventConfig, EventConfigs, Matcher, Strategy, StrategyUpdate, Transform, DEFAULT_KEY,
};
pub use error::{DispatchError, InterceptError, NavigationError, StoreError};
pub use interceptor::{
    is_registered, register_csrf_interceptor, CsrfInterceptor, InterceptorRegistry,
    OutboundRequest, Registration, CSRF_HEADER,
};
pub use navigation::{MemoryNavigator, NavigationHost, PropsSnapshot, ReloadOptions};
pub use optimistic::{KeyPolicy, OptimisticProps, PropUpdate, PropsUpdate};
pub use presence::{
    JoinCallback, LeaveCallback, PresenceListEntry, PresenceOptions, PresenceSubscription,
    SyncCallback,
};
pub use subscription::{
    ChannelHandle, CloseCallback, HandlerMap, ReplyCallback, SubscriptionOptions,
    SubscriptionPhase, TopicSubscription,
};
