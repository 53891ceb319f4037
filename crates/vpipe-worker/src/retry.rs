//! In-process retries for job-store bookkeeping.
//!
//! A job's outcome (complete, fail, handoff) must reach the store even across
//! a short Redis blip, otherwise the lease lapses and the attempt is redone.
//! These helpers cover that window; job-level retries belong to the store.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use vpipe_queue::backoff_delay;

/// Retry policy for a single store call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub operation_name: &'static str,
}

impl RetryConfig {
    pub fn new(operation_name: &'static str) -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_name,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

/// Run `operation` until it succeeds or `should_retry` rejects the error.
pub async fn retry_async<F, Fut, T, E, R>(
    config: &RetryConfig,
    should_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && should_retry(&e) => {
                let delay = backoff_delay(config.base_delay, attempt, config.max_delay);
                attempt += 1;
                debug!(
                    operation = config.operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after error: {}", e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Suppresses log spam from background loops that fail repeatedly.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
        }
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures > self.max_logged_failures {
            debug!(
                "Recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Returns `true` if this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures == self.max_logged_failures + 1 {
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
        }
        self.consecutive_failures <= self.max_logged_failures
    }
}
