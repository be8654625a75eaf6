//! Channel topic names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LiveError;

/// A validated channel topic such as `"room:42"`.
///
/// Topics are opaque to the client apart from two rules: they are non-empty
/// and contain no whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Validate and wrap a topic string.
    pub fn new(topic: impl Into<String>) -> Result<Self, LiveError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(LiveError::InvalidTopic {
                topic,
                reason: "topic must not be empty".to_string(),
            });
        }
        if topic.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LiveError::InvalidTopic {
                topic,
                reason: "topic must not contain whitespace".to_string(),
            });
        }
        Ok(Self(topic))
    }

    /// Get the topic string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `:` (`"room"` for `"room:42"`).
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(ns, _)| ns)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Topic {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = LiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
