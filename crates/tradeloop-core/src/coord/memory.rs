//! In-process coordination store for tests and single-node paper runs.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration as StdDuration, Instant};

use super::CoordStore;
use crate::Result;

#[derive(Default)]
pub struct MemoryCoord {
    locks: DashMap<String, (String, Instant)>,
    counters: DashMap<String, (i64, Instant)>,
}

impl MemoryCoord {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_is_live(entry: &(String, Instant)) -> bool {
        entry.1 > Instant::now()
    }
}

#[async_trait]
impl CoordStore for MemoryCoord {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: StdDuration) -> Result<bool> {
        let now = Instant::now();
        let mut won = false;
        let entry = self
            .locks
            .entry(key.to_string())
            .and_modify(|existing| {
                if !Self::lock_is_live(existing) {
                    *existing = (value.to_string(), now + ttl);
                    won = true;
                }
            })
            .or_insert_with(|| {
                won = true;
                (value.to_string(), now + ttl)
            });
        drop(entry);
        Ok(won)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.locks.remove(key);
        self.counters.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.locks.get(key) {
            if Self::lock_is_live(&entry) {
                return Ok(true);
            }
        }
        if let Some(entry) = self.counters.get(key) {
            return Ok(entry.1 > Instant::now());
        }
        Ok(false)
    }

    async fn incr_with_window(&self, key: &str, window: StdDuration) -> Result<i64> {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        if entry.1 <= now {
            // Window elapsed: restart.
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert((0, Instant::now() + StdDuration::from_secs(3600)));
        entry.0 -= 1;
        Ok(entry.0)
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        match self.counters.get(key) {
            Some(entry) if entry.1 > Instant::now() => Ok(entry.0),
            _ => Ok(0),
        }
    }
}
