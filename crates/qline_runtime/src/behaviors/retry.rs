//! Retry with exponential backoff around `send`.

use std::time::Duration;

use qline_core::{responder, SdkError, SdkResult};

use super::Behavior;
use crate::moments::{SendArgs, SEND};
use crate::queryable::Queryable;
use crate::request::Response;

/// Configuration for retry behavior.
///
/// ```ignore
/// let config = RetryConfig::default()
///     .with_max_retries(5)
///     .with_initial_backoff(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further one.
    pub initial_backoff: Duration,
    /// Upper bound for the computed delay.
    pub max_backoff: Duration,
    /// HTTP status codes that trigger a retry.
    pub retry_on_status: Vec<u16>,
    /// Whether to honour the `Retry-After` header.
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            retry_on_status: vec![408, 425, 429, 502, 503, 504],
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    #[must_use]
    pub fn with_retry_on_status(mut self, status: u16) -> Self {
        if !self.retry_on_status.contains(&status) {
            self.retry_on_status.push(status);
        }
        self
    }

    #[must_use]
    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins when honoured; either way the
    /// result never exceeds `max_backoff`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = match retry_after {
            Some(wait) if self.respect_retry_after => wait,
            _ => self
                .initial_backoff
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        computed.min(self.max_backoff)
    }

    fn should_retry(&self, outcome: &SdkResult<Response>) -> bool {
        match outcome {
            Ok(response) => self.retry_on_status.contains(&response.status),
            Err(err) => err.is_retryable(),
        }
    }
}

/// Parses a `Retry-After` value given in seconds.
fn retry_after(outcome: &SdkResult<Response>) -> Option<Duration> {
    let response = outcome.as_ref().ok()?;
    let seconds = response.headers.get("retry-after")?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Wraps the `send` observer registered at apply time with retries.
///
/// Must be applied after the transport. Replacing `send` afterwards (for
/// example by registering into a batch) discards the retry wrapper.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Behavior for Retry {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        let inner = queryable
            .timeline()
            .snapshot()
            .handlers(&SEND)
            .pop()
            .ok_or_else(|| {
                SdkError::configuration("retry needs a send observer to wrap; apply it after the transport")
            })?;
        let config = self.config.clone();

        queryable.replace(
            &SEND,
            responder(move |args: SendArgs| {
                let inner = inner.clone();
                let config = config.clone();
                async move {
                    let mut attempt = 0;
                    loop {
                        let outcome = inner(args.clone()).await;
                        if attempt >= config.max_retries || !config.should_retry(&outcome) {
                            return outcome;
                        }
                        let delay = config.delay_for(attempt, retry_after(&outcome));
                        match &outcome {
                            Ok(response) => tracing::warn!(
                                status = response.status,
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                "retrying request"
                            ),
                            Err(err) => tracing::warn!(
                                error = %err,
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                "retrying request"
                            ),
                        }
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }),
        )?;
        Ok(())
    }
}
