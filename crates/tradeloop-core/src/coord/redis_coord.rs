//! Redis-backed coordination store.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration as StdDuration;

use super::CoordStore;
use crate::Result;

pub struct RedisCoord {
    conn: redis::aio::ConnectionManager,
    namespace: String,
}

impl RedisCoord {
    pub async fn connect(url: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl CoordStore for RedisCoord {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: StdDuration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.full_key(key)).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(self.full_key(key)).await?)
    }

    async fn incr_with_window(&self, key: &str, window: StdDuration) -> Result<i64> {
        let full = self.full_key(key);
        let mut conn = self.conn.clone();
        // INCR + PEXPIRE NX in one atomic pipeline: the window starts on the
        // first increment and is never extended by later ones.
        let (count, _set): (i64, i64) = redis::pipe()
            .atomic()
            .incr(&full, 1)
            .cmd("PEXPIRE")
            .arg(&full)
            .arg(window.as_millis() as u64)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.decr(self.full_key(key), 1).await?)
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(self.full_key(key)).await?;
        Ok(value.unwrap_or(0))
    }
}
