//! Coordination primitives shared by all three engines.
//!
//! A set-if-absent + TTL key store backs run-level locks, per-entity claim
//! leases, and windowed counters (circuit breaker, daily entry cap). Counter
//! updates are atomic increment-then-threshold-check so concurrent runs
//! deciding from the same burst reach the same conclusion.

mod memory;
mod redis_coord;

pub use memory::MemoryCoord;
pub use redis_coord::RedisCoord;

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::debug;
use uuid::Uuid;

/// Distributed coordination store.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// SET NX with TTL. Returns true when this caller won the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: StdDuration) -> Result<bool>;
    /// Idempotent delete.
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Atomically increment a counter, starting a TTL window on first touch.
    /// Returns the post-increment count.
    async fn incr_with_window(&self, key: &str, window: StdDuration) -> Result<i64>;
    /// Decrement a counter (used to hand back an admission that went unused).
    async fn decr(&self, key: &str) -> Result<i64>;
    /// Current counter value without touching it (0 when absent/expired).
    async fn counter(&self, key: &str) -> Result<i64>;
}

/// A time-bounded exclusive lease on one key.
///
/// Expiry without renewal signals a crash or timeout; reclaim decisions are
/// derived from timestamps on the owned entity, never from the store's own
/// expiry alone.
pub struct Lease {
    store: Arc<dyn CoordStore>,
    key: String,
    token: String,
}

impl Lease {
    /// Try to acquire `key` for `ttl`. `None` means another holder owns it.
    pub async fn acquire(
        store: Arc<dyn CoordStore>,
        key: impl Into<String>,
        ttl: StdDuration,
    ) -> Result<Option<Lease>> {
        let key = key.into();
        let token = Uuid::new_v4().to_string();
        if store.set_if_absent(&key, &token, ttl).await? {
            debug!(key = %key, "Acquired lease");
            Ok(Some(Lease { store, key, token }))
        } else {
            Ok(None)
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lease. Idempotent: releasing an expired lease is a no-op
    /// at the store level.
    pub async fn release(self) -> Result<()> {
        self.store.delete(&self.key).await?;
        debug!(key = %self.key, "Released lease");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let store: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        let ttl = StdDuration::from_secs(30);

        let first = Lease::acquire(store.clone(), "lock:test", ttl)
            .await
            .unwrap()
            .expect("first acquire should win");
        assert!(Lease::acquire(store.clone(), "lock:test", ttl)
            .await
            .unwrap()
            .is_none());

        first.release().await.unwrap();
        assert!(Lease::acquire(store, "lock:test", ttl)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired() {
        let store: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());

        let _old = Lease::acquire(store.clone(), "lock:test", StdDuration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert!(Lease::acquire(store, "lock:test", StdDuration::from_secs(5))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn windowed_counter_increments_and_decrements() {
        let store = MemoryCoord::new();
        let window = StdDuration::from_secs(60);

        assert_eq!(store.incr_with_window("count:test", window).await.unwrap(), 1);
        assert_eq!(store.incr_with_window("count:test", window).await.unwrap(), 2);
        assert_eq!(store.decr("count:test").await.unwrap(), 1);
    }
}
