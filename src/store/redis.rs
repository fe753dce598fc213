//! Redis-backed latency store.
//!
//! All latencies live in a single hash (`HSET key endpoint duration`), read in one
//! `HGETALL` per routing decision.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisResult};
use async_trait::async_trait;
use tokio::time;

use crate::store::{format_duration, LatencySnapshot, LatencyStore, StoreError};

/// Latency store shared by every balancer instance pointing at the same Redis.
#[derive(Clone)]
pub struct RedisLatencyStore {
    conn: ConnectionManager,
    key: String,
    op_timeout: Duration,
}

impl RedisLatencyStore {
    /// Open a managed connection. The manager reconnects on its own after failures.
    pub async fn connect(
        url: &str,
        key: impl Into<String>,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)?;
        let conn = time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        let key = key.into();
        tracing::info!(url = %url, key = %key, "Connected to latency store");

        Ok(Self {
            conn,
            key,
            op_timeout,
        })
    }

    async fn bounded<T>(
        &self,
        limit: Duration,
        op: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match time::timeout(limit, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(limit)),
        }
    }
}

#[async_trait]
impl LatencyStore for RedisLatencyStore {
    async fn ping(&self, timeout: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .bounded(timeout, ::redis::cmd("PING").query_async(&mut conn))
            .await?;
        tracing::debug!(reply = %pong, "Latency store ping");
        Ok(())
    }

    async fn set_latency(&self, endpoint: &str, latency: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let value = format_duration(latency);
        let _: () = self
            .bounded(self.op_timeout, conn.hset(&self.key, endpoint, value))
            .await?;
        Ok(())
    }

    async fn all_latencies(&self) -> Result<LatencySnapshot, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(self.op_timeout, conn.hgetall(&self.key)).await
    }
}
