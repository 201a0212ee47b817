// src/retry/policy.rs

use std::time::Duration;

/// Hard ceiling on any single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

/// Bounded retry-with-backoff settings for one retry call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap on a single delay; never above [`MAX_BACKOFF`].
    pub max_delay: Duration,
    /// Jitter is drawn uniformly from `[0, max_jitter)`.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: MAX_BACKOFF,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// One attempt, no retries.
    pub fn once() -> Self {
        Self::attempts(1)
    }

    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max.min(MAX_BACKOFF);
        self
    }

    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(self, attempt, random_jitter(self.max_jitter))
    }
}

/// `min(base * 2^(attempt-1) + jitter, max_delay, 60s)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, jitter: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let scaled = policy.base_delay.saturating_mul(1u32 << exponent);
    let cap = policy.max_delay.min(MAX_BACKOFF);
    scaled.saturating_add(jitter).min(cap)
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let fraction: f64 = rand::random();
    Duration::from_nanos((max.as_nanos() as f64 * fraction) as u64)
}
