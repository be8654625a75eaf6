//! Connection params and CSRF token sources
//!
//! Params are resolved on every connection attempt, not when the connection
//! is configured, so a rotating token is always read fresh.

use std::fmt;
use std::sync::Arc;

use liveprops_core::Params;
use parking_lot::RwLock;
use serde_json::Value;

/// Param name the server expects the CSRF token under
pub const CSRF_PARAM: &str = "_csrf_token";

/// Where connection params come from
#[derive(Clone)]
pub enum ParamsSource {
    /// The same params for every attempt
    Static(Params),
    /// Params computed at attempt time
    Dynamic(Arc<dyn Fn() -> Params + Send + Sync>),
}

impl ParamsSource {
    /// Wrap a params function
    pub fn dynamic(f: impl Fn() -> Params + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    /// Params carrying the CSRF token read from `source` at attempt time
    pub fn csrf(source: Arc<dyn CsrfTokenSource>) -> Self {
        Self::dynamic(move || csrf_params(source.as_ref()))
    }

    /// Resolve params for one attempt
    pub fn resolve(&self) -> Params {
        match self {
            Self::Static(params) => params.clone(),
            Self::Dynamic(f) => f(),
        }
    }
}

impl Default for ParamsSource {
    fn default() -> Self {
        Self::Static(Params::new())
    }
}

impl fmt::Debug for ParamsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(params) => f.debug_tuple("Static").field(params).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<Params> for ParamsSource {
    fn from(params: Params) -> Self {
        Self::Static(params)
    }
}

/// Supplies the page's CSRF token on demand
pub trait CsrfTokenSource: Send + Sync {
    /// Current token, if the page carries one
    fn token(&self) -> Option<String>;
}

/// A fixed token (or none)
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl CsrfTokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from a `<meta name="csrf-token" content="...">` tag.
///
/// The markup is held behind a lock so the host can swap it on navigation;
/// every call to [`CsrfTokenSource::token`] re-reads it.
#[derive(Debug, Clone)]
pub struct MetaTagTokenSource {
    markup: Arc<RwLock<String>>,
    meta_name: String,
}

impl MetaTagTokenSource {
    /// Read the `csrf-token` meta tag from `markup`
    pub fn new(markup: impl Into<String>) -> Self {
        Self::with_name(markup, "csrf-token")
    }

    /// Read a meta tag with a custom `name`
    pub fn with_name(markup: impl Into<String>, meta_name: impl Into<String>) -> Self {
        Self {
            markup: Arc::new(RwLock::new(markup.into())),
            meta_name: meta_name.into(),
        }
    }

    /// Replace the page markup
    pub fn set_markup(&self, markup: impl Into<String>) {
        *self.markup.write() = markup.into();
    }
}

impl CsrfTokenSource for MetaTagTokenSource {
    fn token(&self) -> Option<String> {
        let markup = self.markup.read();
        find_meta_content(&markup, &self.meta_name)
    }
}

/// `{ "_csrf_token": token }` when a token is available, `{}` otherwise
pub fn csrf_params(source: &dyn CsrfTokenSource) -> Params {
    let mut params = Params::new();
    if let Some(token) = source.token() {
        params.insert(CSRF_PARAM.to_string(), Value::String(token));
    }
    params
}

fn find_meta_content(markup: &str, name: &str) -> Option<String> {
    let mut rest = markup;
    while let Some(start) = rest.find("<meta") {
        let tag_start = &rest[start..];
        let end = tag_start.find('>')?;
        let tag = &tag_start[..end];
        if attribute(tag, "name") == Some(name) {
            if let Some(content) = attribute(tag, "content") {
                return Some(content.to_string());
            }
        }
        rest = &tag_start[end..];
    }
    None
}

fn attribute<'a>(tag: &'a str, attr: &str) -> Option<&'a str> {
    let needle = format!("{attr}=");
    let mut search_from = 0;
    while let Some(offset) = tag[search_from..].find(&needle) {
        let at = search_from + offset;
        search_from = at + needle.len();
        // Reject suffix matches such as `data-name=`
        let preceded_by_space = tag[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded_by_space {
            continue;
        }
        let value = &tag[search_from..];
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let inner = &value[1..];
        return inner.find(quote).map(|close| &inner[..close]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const PAGE: &str = r#"<html><head>
        <meta charset="utf-8">
        <meta data-name="csrf-token" content="decoy">
        <meta name="csrf-token" content="tok-123">
    </head></html>"#;

    #[test]
    fn test_meta_tag_token() {
        let source = MetaTagTokenSource::new(PAGE);
        assert_eq!(source.token().as_deref(), Some("tok-123"));

        source.set_markup("<meta name='csrf-token' content='tok-456'>");
        assert_eq!(source.token().as_deref(), Some("tok-456"));

        source.set_markup("<html></html>");
        assert_eq!(source.token(), None);
    }

    #[test]
    fn test_csrf_params() {
        let params = csrf_params(&StaticToken(Some("abc".into())));
        assert_eq!(params.get(CSRF_PARAM), Some(&Value::String("abc".into())));
        assert!(csrf_params(&StaticToken(None)).is_empty());
    }

    #[test]
    fn test_dynamic_params_resolve_each_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        let source = ParamsSource::dynamic(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            let mut params = Params::new();
            params.insert("attempt".into(), n.into());
            params
        });

        assert_eq!(source.resolve().get("attempt"), Some(&Value::from(0)));
        assert_eq!(source.resolve().get("attempt"), Some(&Value::from(1)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
