//! Redis list backend.
//!
//! Channels map to Redis lists: `enqueue` is LPUSH, `dequeue` is BRPOP with
//! a blocking timeout, so jobs hand off FIFO and each pop is atomic across
//! concurrent consumers.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use crate::client::{JobQueue, QueueHealth};
use crate::error::QueueError;

/// Redis-backed job queue over a shared multiplexed connection.
///
/// The connection is cheap to clone; each operation works on its own clone
/// so the client is `Send + Sync` without locking.
pub struct RedisQueue {
    conn: MultiplexedConnection,
}

impl RedisQueue {
    /// Connect to the broker at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("redis queue connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, channel: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(channel, payload).await?;
        Ok(())
    }

    async fn dequeue(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        // BRPOP returns (channel, payload) or nil on timeout.
        let popped: Option<(String, String)> =
            conn.brpop(channel, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(QueueHealth {
            connected: pong == "PONG",
            provider: "redis".to_string(),
        })
    }
}
