//! Categorized liveprops errors
//!
//! Every crate in the workspace defines errors for its own concern and
//! converts them into [`LiveError`] at crate boundaries. The category lets a
//! host decide how to surface a failure (a "disconnected" banner for network
//! errors, a toast for rejected input, a crash report for broken state).

use std::fmt;

/// High-level error categories for host-side error handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection or channel level failures (often transient)
    Network,
    /// The server answered, but not the way the client expected
    Protocol,
    /// Caller-supplied data was invalid (correctable by the caller)
    Input,
    /// Invalid configuration
    Config,
    /// Local state could not be read or written as requested
    State,
}

impl ErrorCategory {
    /// Check if this error category is likely transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Check if the caller can fix the problem without a code change.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Input | Self::Config)
    }

    /// Get a short label for this category.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::Protocol => "Protocol",
            Self::Input => "Input",
            Self::Config => "Config",
            Self::State => "State",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Unified error type for liveprops operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiveError {
    /// The transport failed to carry a message
    #[error("Transport failure: {reason}")]
    Transport {
        /// Reason reported by the transport
        reason: String,
    },
    /// An operation targeted a channel that is no longer open
    #[error("Channel '{topic}' is closed")]
    ChannelClosed {
        /// Topic of the closed channel
        topic: String,
    },
    /// The server rejected a topic join
    #[error("Join rejected for '{topic}': {reply}")]
    JoinRejected {
        /// Topic that was rejected
        topic: String,
        /// Serialized server reply
        reply: String,
    },
    /// An inbound event could not be applied to the props store
    #[error("Failed to apply '{event}': {reason}")]
    Dispatch {
        /// Event name that triggered the update
        event: String,
        /// Reason the update failed
        reason: String,
    },
    /// The props store refused a read or write
    #[error("Props store error: {reason}")]
    Store {
        /// Reason for the failure
        reason: String,
    },
    /// The navigation host failed to serve a request
    #[error("Navigation error: {reason}")]
    Navigation {
        /// Reason for the failure
        reason: String,
    },
    /// Configuration could not be loaded or validated
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Reason for the failure
        reason: String,
    },
    /// A declared dependency was not available
    #[error("Missing required data: {what}")]
    MissingData {
        /// Name of the missing dependency
        what: String,
    },
    /// A payload could not be (de)serialized
    #[error("Serialization failed: {error}")]
    Serialization {
        /// Serializer error message
        error: String,
    },
    /// A topic name was rejected
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic {
        /// Offending topic string
        topic: String,
        /// Reason for rejection
        reason: String,
    },
}

impl LiveError {
    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a dispatch error for an event
    pub fn dispatch(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a missing data error
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData { what: what.into() }
    }

    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } | Self::ChannelClosed { .. } => ErrorCategory::Network,
            Self::JoinRejected { .. } | Self::Serialization { .. } => ErrorCategory::Protocol,
            Self::Dispatch { .. } | Self::InvalidTopic { .. } => ErrorCategory::Input,
            Self::Config { .. } => ErrorCategory::Config,
            Self::Store { .. } | Self::Navigation { .. } | Self::MissingData { .. } => {
                ErrorCategory::State
            }
        }
    }

    /// Check if retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.category().is_transient()
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            error: error.to_string(),
        }
    }
}

/// Result alias used across the workspace
pub type LiveResult<T> = Result<T, LiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_routing() {
        assert_eq!(
            LiveError::transport("socket reset").category(),
            ErrorCategory::Network
        );
        assert_eq!(
            LiveError::JoinRejected {
                topic: "room:1".into(),
                reply: "{}".into()
            }
            .category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            LiveError::dispatch("message_created", "not a list").category(),
            ErrorCategory::Input
        );
        assert_eq!(LiveError::missing("csrf token").category(), ErrorCategory::State);
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(LiveError::transport("timeout").is_transient());
        assert!(!LiveError::config("bad endpoint").is_transient());
        assert!(ErrorCategory::Config.is_user_correctable());
        assert!(!ErrorCategory::State.is_user_correctable());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let live: LiveError = err.into();
        assert!(matches!(live, LiveError::Serialization { .. }));
        assert_eq!(live.category(), ErrorCategory::Protocol);
    }
}
