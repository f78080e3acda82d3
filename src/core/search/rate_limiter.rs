//! Process-wide search rate limiter.
//!
//! Models the politeness contract of an external search service: one
//! mutex-guarded timestamp shared by every caller in the process.
//! Contention is bounded by the interval itself.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

static GLOBAL_LIMITER: OnceCell<Arc<SearchRateLimiter>> = OnceCell::new();

/// Enforces a minimum interval between outbound search requests.
#[derive(Debug)]
pub struct SearchRateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl SearchRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// The process-wide limiter. The first caller's interval wins; the
    /// limiter is intentionally shared across every search client.
    pub fn global(min_interval: Duration) -> Arc<Self> {
        Arc::clone(GLOBAL_LIMITER.get_or_init(|| Arc::new(Self::new(min_interval))))
    }

    /// Wait until the interval since the previous request has elapsed,
    /// then stamp the clock. Holding the lock across the sleep
    /// serializes waiters, which is exactly the contract.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let since = at.elapsed();
            if since < self.min_interval {
                let wait = self.min_interval - since;
                debug!(wait_ms = wait.as_millis() as u64, "rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_by_the_minimum_interval() {
        let limiter = SearchRateLimiter::new(Duration::from_millis(1500));

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10), "first pass is free");

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1500));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_interval_means_no_wait() {
        let limiter = SearchRateLimiter::new(Duration::from_millis(100));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
