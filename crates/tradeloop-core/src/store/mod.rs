//! Ledger persistence.
//!
//! The engines only need whole-collection read-modify-write atomicity; each
//! run reads a collection, mutates in memory, and writes it back in one shot
//! while holding the relevant claims/locks.

mod memory;
mod redis_store;

pub use memory::MemoryLedger;
pub use redis_store::RedisLedger;

use crate::types::{Signal, Trade};
use crate::Result;
use async_trait::async_trait;

/// Whole-collection ledger store for Signals and Trades.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn read_signals(&self) -> Result<Vec<Signal>>;
    async fn write_signals(&self, signals: &[Signal]) -> Result<()>;
    async fn read_trades(&self) -> Result<Vec<Trade>>;
    async fn write_trades(&self, trades: &[Trade]) -> Result<()>;
}
