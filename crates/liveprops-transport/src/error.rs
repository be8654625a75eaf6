//! Transport and configuration errors
//!
//! Both convert into [`LiveError`] so callers above the transport only deal
//! with the unified type.

use liveprops_core::LiveError;

/// Failures reported by a channel transport
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// A push targeted a channel that has not joined yet
    #[error("Channel '{topic}' has not joined")]
    NotJoined {
        /// Topic of the channel
        topic: String,
    },
    /// A push targeted a channel that was left or closed
    #[error("Channel '{topic}' is closed")]
    ChannelClosed {
        /// Topic of the channel
        topic: String,
    },
}

impl From<TransportError> for LiveError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::ChannelClosed { topic } => LiveError::ChannelClosed { topic },
            other => LiveError::transport(other.to_string()),
        }
    }
}

/// Result alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration text could not be parsed
    #[error("Failed to parse connection config: {0}")]
    Parse(String),
    /// A field failed validation
    #[error("Invalid connection config: {field} - {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Reason for rejection
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for LiveError {
    fn from(error: ConfigError) -> Self {
        LiveError::config(error.to_string())
    }
}
