//! Redis-backed ledger: one JSON blob per collection.

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

use super::LedgerStore;
use crate::types::{Signal, Trade};
use crate::Result;

/// Ledger collections stored as serialized JSON arrays under namespaced keys.
pub struct RedisLedger {
    conn: Mutex<redis::aio::ConnectionManager>,
    signals_key: String,
    trades_key: String,
}

impl RedisLedger {
    pub async fn connect(url: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Mutex::new(conn),
            signals_key: format!("{namespace}:ledger:signals"),
            trades_key: format!("{namespace}:ledger:trades"),
        })
    }

    async fn read_collection<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_collection<T: serde::Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        let mut conn = self.conn.lock().await;
        let _: () = conn.set(key, json).await?;
        debug!(key = %key, count = items.len(), "Wrote ledger collection");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RedisLedger {
    async fn read_signals(&self) -> Result<Vec<Signal>> {
        self.read_collection(&self.signals_key).await
    }

    async fn write_signals(&self, signals: &[Signal]) -> Result<()> {
        self.write_collection(&self.signals_key, signals).await
    }

    async fn read_trades(&self) -> Result<Vec<Trade>> {
        self.read_collection(&self.trades_key).await
    }

    async fn write_trades(&self, trades: &[Trade]) -> Result<()> {
        self.write_collection(&self.trades_key, trades).await
    }
}
