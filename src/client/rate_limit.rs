//! Client-side rate limiting.
//!
//! One [`RateLimiter`] is shared by every request to the same region and
//! environment. It is a token bucket refilled at the rate the server
//! declares, starting from the configured rate.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Shared token-bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(requests_per_second: u32) -> Self {
        let rate = f64::from(requests_per_second.max(1));
        Self {
            tokens: rate,
            max_tokens: rate,
            refill_rate: rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
        }
    }
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second`.
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(requests_per_second)),
        }
    }

    /// Waits until a request may be sent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_acquire() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            debug!(wait_ms = wait.as_millis(), "Rate limit reached, waiting for a token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Adopts the rate the server declared, e.g. from `X-RateLimit-Limit`.
    pub async fn observe_limit(&self, requests_per_second: u32) {
        let rate = f64::from(requests_per_second.max(1));
        let mut bucket = self.bucket.lock().await;
        if (bucket.refill_rate - rate).abs() > f64::EPSILON {
            debug!(requests_per_second, "Adjusting rate limit to server-declared value");
            bucket.refill_rate = rate;
            bucket.max_tokens = rate;
            bucket.tokens = bucket.tokens.min(rate);
        }
    }

    /// Current refill rate in requests per second.
    pub async fn rate(&self) -> f64 {
        self.bucket.lock().await.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_up_to_capacity() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_waits_when_empty() {
        let limiter = RateLimiter::new(10);
        for _ in 0..10 {
            limiter.acquire().await;
        }
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_observe_limit() {
        let limiter = RateLimiter::new(10);
        limiter.observe_limit(2).await;
        assert!((limiter.rate().await - 2.0).abs() < f64::EPSILON);
    }
}
