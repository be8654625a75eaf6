//! Host-provided transport logger
//!
//! A host may hand the connection a logger that sees every transport log
//! line (`kind`, `message`, `data`). A failing logger never takes the
//! connection down with it: [`SafeLogger`] reports the failure through
//! `tracing` and moves on.

use std::fmt;
use std::sync::Arc;

use liveprops_core::Payload;
use tracing::{debug, warn};

/// Error returned by a host logger
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LoggerError(pub String);

/// Receives transport log lines
pub trait TransportLogger: Send + Sync {
    /// Record one log line
    fn log(&self, kind: &str, message: &str, data: &Payload) -> Result<(), LoggerError>;
}

impl<F> TransportLogger for F
where
    F: Fn(&str, &str, &Payload) -> Result<(), LoggerError> + Send + Sync,
{
    fn log(&self, kind: &str, message: &str, data: &Payload) -> Result<(), LoggerError> {
        self(kind, message, data)
    }
}

/// Forwards transport log lines to `tracing` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TransportLogger for TracingLogger {
    fn log(&self, kind: &str, message: &str, data: &Payload) -> Result<(), LoggerError> {
        debug!(kind = %kind, data = %data, "{message}");
        Ok(())
    }
}

/// Optional logger wrapper that never propagates logger failures
#[derive(Clone, Default)]
pub struct SafeLogger {
    inner: Option<Arc<dyn TransportLogger>>,
}

impl SafeLogger {
    /// Wrap an optional logger; `None` logs nothing
    pub fn new(inner: Option<Arc<dyn TransportLogger>>) -> Self {
        Self { inner }
    }

    /// Whether a host logger is installed
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Log a line, swallowing and reporting logger errors
    pub fn log(&self, kind: &str, message: &str, data: &Payload) {
        let Some(logger) = &self.inner else {
            return;
        };
        if let Err(error) = logger.log(kind, message, data) {
            warn!(kind = %kind, error = %error, "Transport logger failed");
        }
    }
}

impl fmt::Debug for SafeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeLogger")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_default_logger_is_noop() {
        let logger = SafeLogger::default();
        assert!(!logger.is_enabled());
        logger.log("push", "room:1 ping", &json!({}));
    }

    #[test]
    fn test_tracing_logger_never_fails() {
        let logger = SafeLogger::new(Some(Arc::new(TracingLogger)));
        assert!(logger.is_enabled());
        assert_eq!(TracingLogger.log("push", "room:1 ping", &json!({"n": 1})), Ok(()));
        logger.log("push", "room:1 ping", &json!({"n": 1}));
    }

    #[test]
    fn test_failing_logger_does_not_propagate() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let failing = move |_: &str, _: &str, _: &Payload| -> Result<(), LoggerError> {
            *counter.lock() += 1;
            Err(LoggerError("sink unavailable".into()))
        };
        let failing: Arc<dyn TransportLogger> = Arc::new(failing);
        let logger = SafeLogger::new(Some(failing));

        logger.log("transport", "connected", &Payload::Null);
        logger.log("transport", "connected", &Payload::Null);

        assert_eq!(*calls.lock(), 2);
    }
}
