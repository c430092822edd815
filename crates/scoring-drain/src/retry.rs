//! Retry policy: capped exponential backoff with uniform jitter.

use rand::Rng;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), jittered.
    pub fn backoff(&self, attempt: u32) -> StdDuration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay_ms);
        let jitter = rand::rng().random_range(0..=exp / 2);
        StdDuration::from_millis(exp + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 400,
        };
        for _ in 0..20 {
            let first = policy.backoff(1).as_millis() as u64;
            assert!((100..=150).contains(&first));
            let third = policy.backoff(3).as_millis() as u64;
            // Capped at 400ms plus up to half jitter.
            assert!((400..=600).contains(&third));
        }
    }
}
