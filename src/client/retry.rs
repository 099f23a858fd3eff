//! Retry policy for PingOne requests.
//!
//! The policy is expressed as an iterator of delays: the caller asks for the
//! next delay after every transient failure and gives up when the iterator
//! is exhausted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied after every retry.
    pub factor: f64,
    /// Upper bound of a single delay.
    pub max_delay: Duration,
    /// Relative jitter applied to every delay, e.g. `0.2` for ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Returns the delays between consecutive attempts.
    #[must_use]
    pub const fn delays(&self) -> Backoff {
        Backoff {
            policy: *self,
            retry: 0,
        }
    }

    /// Delay before retry number `retry` (zero-based), without jitter.
    #[must_use]
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = self.base_delay.as_secs_f64() * 1000.0 * self.factor.powi(exp);
        let capped = millis.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_secs_f64(capped.max(0.0) / 1000.0)
    }
}

/// Iterator of backoff delays produced by [`RetryPolicy::delays`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    retry: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retry + 1 >= self.policy.max_attempts {
            return None;
        }
        let nominal = self.policy.nominal_delay(self.retry);
        self.retry += 1;

        if self.policy.jitter <= 0.0 || nominal.is_zero() {
            return Some(nominal);
        }
        let spread = self.policy.jitter.min(1.0);
        let scale = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        Some(nominal.mul_f64(scale))
    }
}

/// Returns true if a response with `status` should be retried.
///
/// Every 5xx except 501 is transient, as is 429.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    status == 429 || (status >= 500 && status <= 599 && status != 501)
}

/// Parses a `Retry-After` header value.
///
/// Both delta-seconds and HTTP-date forms are accepted; a date in the past
/// yields a zero delay.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}
