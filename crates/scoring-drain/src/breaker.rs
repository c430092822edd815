//! Circuit breaker for the scoring model dependency.
//!
//! State lives in the coordination store, not in process memory: the drain is
//! invoked independently per trigger, so an error burst must be visible
//! across concurrent invocations. Tripping is increment-then-threshold-check,
//! which makes two runs deciding from the same burst idempotent.

use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use tradeloop_core::coord::CoordStore;
use tradeloop_core::Result;

/// Configuration for circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Errors within the rolling window before the breaker opens.
    pub trip_threshold: i64,
    /// Rolling error-count window.
    pub window: StdDuration,
    /// How long calls are short-circuited once open.
    pub cooldown: StdDuration,
    /// Whether the breaker is enforced at all.
    pub enabled: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip_threshold: 5,
            window: StdDuration::from_secs(120),
            cooldown: StdDuration::from_secs(300),
            enabled: true,
        }
    }
}

impl BreakerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trip_threshold: std::env::var("BREAKER_TRIP_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.trip_threshold),
            window: std::env::var("BREAKER_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.window),
            cooldown: std::env::var("BREAKER_COOLDOWN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.cooldown),
            enabled: std::env::var("BREAKER_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(defaults.enabled),
        }
    }
}

const ERRORS_KEY: &str = "breaker:scoring:errors";
const OPEN_KEY: &str = "breaker:scoring:open";

/// Process-wide breaker over the shared coordination store.
pub struct ScoringBreaker {
    coord: Arc<dyn CoordStore>,
    config: BreakerConfig,
}

impl ScoringBreaker {
    pub fn new(coord: Arc<dyn CoordStore>, config: BreakerConfig) -> Self {
        Self { coord, config }
    }

    /// Whether calls should short-circuit right now.
    pub async fn is_open(&self) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        self.coord.exists(OPEN_KEY).await
    }

    /// Count one retries-exhausted failure against the rolling window,
    /// opening the breaker when the threshold is crossed. Returns true when
    /// this call is the one that opened it.
    pub async fn record_failure(&self) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let count = self
            .coord
            .incr_with_window(ERRORS_KEY, self.config.window)
            .await?;
        if count < self.config.trip_threshold {
            warn!(count, threshold = self.config.trip_threshold, "Scoring failure recorded");
            return Ok(false);
        }
        let opened = self
            .coord
            .set_if_absent(OPEN_KEY, "open", self.config.cooldown)
            .await?;
        if opened {
            info!(
                count,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Scoring circuit breaker opened"
            );
        }
        Ok(opened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeloop_core::coord::MemoryCoord;

    fn breaker(threshold: i64) -> ScoringBreaker {
        ScoringBreaker::new(
            Arc::new(MemoryCoord::new()),
            BreakerConfig {
                trip_threshold: threshold,
                window: StdDuration::from_secs(60),
                cooldown: StdDuration::from_secs(60),
                enabled: true,
            },
        )
    }

    #[tokio::test]
    async fn opens_at_threshold_and_only_once() {
        let breaker = breaker(3);
        assert!(!breaker.is_open().await.unwrap());

        assert!(!breaker.record_failure().await.unwrap());
        assert!(!breaker.record_failure().await.unwrap());
        // Third failure crosses the threshold.
        assert!(breaker.record_failure().await.unwrap());
        assert!(breaker.is_open().await.unwrap());

        // Further failures while open do not re-trip.
        assert!(!breaker.record_failure().await.unwrap());
    }

    #[tokio::test]
    async fn disabled_breaker_never_opens() {
        let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        let breaker = ScoringBreaker::new(
            coord,
            BreakerConfig {
                enabled: false,
                trip_threshold: 1,
                ..Default::default()
            },
        );
        assert!(!breaker.record_failure().await.unwrap());
        assert!(!breaker.is_open().await.unwrap());
    }
}
