//! Request pacing against the provider

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Shared limiter for every request a fetcher sends
#[derive(Clone)]
pub struct ProviderRateLimiter {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ProviderRateLimiter {
    /// Allow `requests_per_second` requests (fractional rates allowed)
    pub fn new(requests_per_second: f64) -> Self {
        let period = Duration::from_secs_f64(1.0 / requests_per_second.max(0.001));
        let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(nonzero!(1u32)));

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        if self.limiter.check().is_err() {
            trace!("Rate limiting provider request");
            self.limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_limiter_spaces_requests() {
        let limiter = ProviderRateLimiter::new(10.0);

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;

        // 3 requests at 10/s need at least 2 intervals
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_fast_limiter_does_not_stall() {
        let limiter = ProviderRateLimiter::new(1000.0);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
