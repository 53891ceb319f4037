//! Windowed call budget for the vision provider.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// At most `calls` acquisitions per `window`, shared by every task of a pool.
///
/// Acquiring blocks until a slot frees; it never fails. The budget refills
/// one call every `window / calls`, with bursts of up to `calls`.
pub struct CallBudget {
    limiter: Option<DirectLimiter>,
    calls: u32,
    window: Duration,
}

impl CallBudget {
    /// A zero call count or zero window disables the budget.
    pub fn new(calls: u32, window: Duration) -> Self {
        let limiter = NonZeroU32::new(calls).and_then(|burst| {
            Quota::with_period(window / calls)
                .map(|quota| RateLimiter::direct(quota.allow_burst(burst)))
        });

        Self {
            limiter,
            calls,
            window,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Wait for a slot.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!(
                    calls = self.calls,
                    window_secs = self.window.as_secs_f64(),
                    "AI call budget exhausted, waiting for a slot"
                );
                limiter.until_ready().await;
            }
        }
    }
}
