//! Missing-data policy

use serde::{Deserialize, Serialize};

use crate::error::LiveError;

/// What to do when a declared dependency (a CSRF token, a scoped value) is
/// not available at the moment it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Fail with [`LiveError::MissingData`]
    Error,
    /// Leave the input unmodified and carry on
    #[default]
    PassThrough,
}

impl MissingDataPolicy {
    /// Resolve `value` under this policy.
    ///
    /// Returns `Ok(Some(v))` when present, `Ok(None)` when absent and the
    /// policy passes through, and an error when absent under
    /// [`MissingDataPolicy::Error`].
    pub fn resolve<T>(self, what: &str, value: Option<T>) -> Result<Option<T>, LiveError> {
        match (value, self) {
            (Some(value), _) => Ok(Some(value)),
            (None, Self::PassThrough) => Ok(None),
            (None, Self::Error) => Err(LiveError::missing(what)),
        }
    }
}
