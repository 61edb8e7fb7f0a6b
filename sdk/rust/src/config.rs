//! Client configuration.

use std::time::Duration;

use indexmap::IndexMap;
use qline_graph::GRAPH_BASE;
use qline_runtime::RetryConfig;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the API, including the version segment.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for the transport.
    pub retry: RetryConfig,
    /// Headers added to every request.
    pub headers: IndexMap<String, String>,
    /// Fixed bearer token. `None` leaves auth to the caller.
    pub bearer_token: Option<String>,
    /// Maximum sub-requests per `$batch` call.
    pub max_batch_requests: usize,
    /// Log each moment and stamp `client-request-id`.
    pub diagnostics: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: GRAPH_BASE.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            headers: IndexMap::new(),
            bearer_token: None,
            max_batch_requests: 20,
            diagnostics: false,
        }
    }
}

impl ClientConfig {
    /// Creates a new config with a base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Adds a default header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets a fixed bearer token.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the `$batch` chunk size.
    pub fn max_batch_requests(mut self, max: usize) -> Self {
        self.max_batch_requests = max.max(1);
        self
    }

    /// Enables request diagnostics.
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }
}
