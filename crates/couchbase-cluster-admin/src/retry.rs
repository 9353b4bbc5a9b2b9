//! Bounded retry for requests that time out waiting for a response

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry policy.
///
/// Only failures accepted by the caller's predicate are retried. For the
/// HTTP transport that predicate is [`is_read_timeout`]: the connection was
/// made but the server did not answer in time. Refused connections, DNS and
/// TLS failures and HTTP error responses are never retried, because most
/// admin calls change cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that performs exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Create retry policy from environment variables
    pub fn from_env() -> Self {
        Self {
            max_attempts: std::env::var("COUCHBASE_ADMIN_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            delay: std::env::var("COUCHBASE_ADMIN_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis),
        }
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. `f` receives the 1-based attempt number.
    pub async fn execute<F, Fut, T, E, P>(&self, should_retry: P, mut f: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match f(attempt).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt >= max_attempts || !should_retry(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Attempt {} of {} timed out, {} retries left: {}",
                        attempt,
                        max_attempts,
                        max_attempts - attempt,
                        e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// A timeout that happened after the connection was established.
///
/// Only sound when connection setup cannot outlast the request timer,
/// which [`HttpTransport`](crate::transport::HttpTransport) ensures.
pub fn is_read_timeout(error: &reqwest::Error) -> bool {
    error.is_timeout() && !error.is_connect()
}
