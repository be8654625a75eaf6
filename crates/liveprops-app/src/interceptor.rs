//! CSRF request interceptor
//!
//! Adds the page's CSRF token to outbound HTTP requests. A host installs at
//! most one interceptor per process; installing again is a logged no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use liveprops_core::MissingDataPolicy;
use liveprops_transport::CsrfTokenSource;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::InterceptError;

/// Header carrying the token
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Minimal view of an outbound HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: String,
    /// Target URL
    pub url: String,
    /// Header name to value
    pub headers: BTreeMap<String, String>,
}

impl OutboundRequest {
    /// Request with no headers
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }
}

/// Adds [`CSRF_HEADER`] from a token source
#[derive(Clone)]
pub struct CsrfInterceptor {
    source: Arc<dyn CsrfTokenSource>,
    policy: MissingDataPolicy,
}

impl CsrfInterceptor {
    /// Interceptor reading `source` on every request
    pub fn new(source: Arc<dyn CsrfTokenSource>) -> Self {
        Self {
            source,
            policy: MissingDataPolicy::default(),
        }
    }

    /// Set what happens when the page has no token
    #[must_use]
    pub fn with_policy(mut self, policy: MissingDataPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add the token header to `request`
    pub fn apply(&self, request: &mut OutboundRequest) -> Result<(), InterceptError> {
        let token = self
            .policy
            .resolve("csrf token", self.source.token())
            .map_err(|_| InterceptError::MissingToken)?;
        match token {
            Some(token) => {
                request.headers.insert(CSRF_HEADER.to_string(), token);
            }
            None => debug!(url = %request.url, "No CSRF token; request left unmodified"),
        }
        Ok(())
    }
}

impl fmt::Debug for CsrfInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfInterceptor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`InterceptorRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The interceptor is now active
    Registered,
    /// One was already active; the new one was dropped
    AlreadyRegistered,
}

/// Holder of the one active interceptor
#[derive(Debug, Default)]
pub struct InterceptorRegistry {
    active: Mutex<Option<CsrfInterceptor>>,
}

static GLOBAL_REGISTRY: Lazy<InterceptorRegistry> = Lazy::new(InterceptorRegistry::default);

impl InterceptorRegistry {
    /// The process-wide registry
    pub fn global() -> &'static InterceptorRegistry {
        &GLOBAL_REGISTRY
    }

    /// Install `interceptor` unless one is already active
    pub fn register(&self, interceptor: CsrfInterceptor) -> Registration {
        let mut active = self.active.lock();
        if active.is_some() {
            warn!("CSRF interceptor already registered; skipping");
            return Registration::AlreadyRegistered;
        }
        *active = Some(interceptor);
        info!("CSRF interceptor registered");
        Registration::Registered
    }

    /// Whether an interceptor is active
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Remove the active interceptor. Returns whether one was active.
    pub fn unregister(&self) -> bool {
        self.active.lock().take().is_some()
    }

    /// Run the active interceptor, if any, over `request`
    pub fn intercept(&self, request: &mut OutboundRequest) -> Result<(), InterceptError> {
        let interceptor = self.active.lock().clone();
        match interceptor {
            Some(interceptor) => interceptor.apply(request),
            None => Ok(()),
        }
    }
}

/// Install `interceptor` in the process-wide registry
pub fn register_csrf_interceptor(interceptor: CsrfInterceptor) -> Registration {
    InterceptorRegistry::global().register(interceptor)
}

/// Whether the process-wide registry has an interceptor
#[must_use]
pub fn is_registered() -> bool {
    InterceptorRegistry::global().is_registered()
}
