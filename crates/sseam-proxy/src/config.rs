//! Per-process proxy configuration.
//!
//! Built once from CLI arguments at startup and shared read-only with
//! every connection handler through the server's app state. Nothing here
//! is mutated after construction.
//!
//! **Environment variables:**
//! - `REQUEST_TIMEOUT_SECS`: upstream request timeout (default: 600,
//!   generous enough for long model-generation streams)

use std::env;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream base URL with any trailing slash removed.
    pub upstream_base: String,
    /// Bearer token injected on every forwarded request.
    pub api_key: String,
    /// Replacement for hardcoded `gpt-4o-mini*` model names, if any.
    pub model_override: Option<String>,
    /// Upstream request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn new(
        upstream_base: impl Into<String>,
        api_key: impl Into<String>,
        model_override: Option<String>,
    ) -> Self {
        Self {
            upstream_base: upstream_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_override: model_override.filter(|model| !model.is_empty()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Full upstream URL for a forwarded request path. The path keeps any
    /// query string it arrived with.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.upstream_base, path_and_query)
    }
}
