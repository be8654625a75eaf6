//! Errors raised by the props store, the dispatcher and the navigation seam

use liveprops_core::LiveError;

/// Navigation host failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    /// The host could not start a reload
    #[error("Reload failed: {0}")]
    ReloadFailed(String),
    /// A snapshot was not a JSON object
    #[error("Props snapshot must be an object, got {0}")]
    NotAnObject(&'static str),
}

/// Props store failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A write targeted a key outside the snapshot's key space
    #[error("Unknown prop '{key}'")]
    UnknownProp {
        /// Offending key
        key: String,
    },
    /// The merged props did not match the requested type
    #[error("Props do not match the requested shape: {error}")]
    Shape {
        /// Deserializer message
        error: String,
    },
    /// Reload could not be started
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Failures while applying an update strategy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// A sequence strategy found a non-array value
    #[error("Prop '{prop}' is not a list")]
    NotASequence {
        /// Target prop
        prop: String,
    },
    /// The transformed payload lacks the identity field
    #[error("Payload for '{prop}' has no '{key}' field")]
    MissingKey {
        /// Target prop
        prop: String,
        /// Identity field
        key: String,
    },
    /// A caller-supplied transform failed
    #[error("Transform for '{prop}' failed: {source}")]
    Transform {
        /// Target prop
        prop: String,
        /// The transform's error
        source: LiveError,
    },
    /// The store refused the write
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reload could not be started
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Request interception failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterceptError {
    /// No CSRF token was available and the policy requires one
    #[error("CSRF token unavailable")]
    MissingToken,
}

impl From<NavigationError> for LiveError {
    fn from(error: NavigationError) -> Self {
        LiveError::Navigation {
            reason: error.to_string(),
        }
    }
}

impl From<StoreError> for LiveError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Navigation(error) => error.into(),
            other => LiveError::Store {
                reason: other.to_string(),
            },
        }
    }
}

impl From<InterceptError> for LiveError {
    fn from(error: InterceptError) -> Self {
        match error {
            InterceptError::MissingToken => LiveError::missing("csrf token"),
        }
    }
}

impl DispatchError {
    /// Attach the event name and convert
    pub fn for_event(self, event: &str) -> LiveError {
        LiveError::dispatch(event, self.to_string())
    }
}
