//! In-memory ledger for tests and paper runs.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::LedgerStore;
use crate::types::{Signal, Trade};
use crate::Result;

#[derive(Default)]
pub struct MemoryLedger {
    signals: RwLock<Vec<Signal>>,
    trades: RwLock<Vec<Trade>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_signals(&self, signals: Vec<Signal>) {
        *self.signals.write().await = signals;
    }

    pub async fn seed_trades(&self, trades: Vec<Trade>) {
        *self.trades.write().await = trades;
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn read_signals(&self) -> Result<Vec<Signal>> {
        Ok(self.signals.read().await.clone())
    }

    async fn write_signals(&self, signals: &[Signal]) -> Result<()> {
        *self.signals.write().await = signals.to_vec();
        Ok(())
    }

    async fn read_trades(&self) -> Result<Vec<Trade>> {
        Ok(self.trades.read().await.clone())
    }

    async fn write_trades(&self, trades: &[Trade]) -> Result<()> {
        *self.trades.write().await = trades.to_vec();
        Ok(())
    }
}
