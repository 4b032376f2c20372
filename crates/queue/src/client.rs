//! Job queue trait and types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::QueueError;

/// Health status of a queue connection.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    /// Whether the broker is reachable.
    pub connected: bool,
    /// Queue provider name (e.g., "redis", "memory").
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueHealth {{ connected: {}, provider: {} }}",
            self.connected, self.provider
        )
    }
}

/// Trait for queue backends moving job payloads between pipeline stages.
///
/// Channels are named FIFO lists. Delivery is at-least-once with no
/// lease or redelivery: a payload popped by a consumer that crashes before
/// finishing is lost. Consumers must therefore be idempotent; loss is
/// surfaced by the stale-batch sweep, not by the queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a payload to the named channel.
    async fn enqueue(&self, channel: &str, payload: &str) -> Result<(), QueueError>;

    /// Block up to `timeout` for one payload from the named channel.
    ///
    /// Returns `Ok(None)` when the channel stayed empty for the whole
    /// timeout. Dequeue is atomic: no two consumers receive the same
    /// payload.
    async fn dequeue(&self, channel: &str, timeout: Duration)
        -> Result<Option<String>, QueueError>;

    /// Check broker connectivity.
    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}

/// Serialize a job and append it to `channel`.
pub async fn enqueue_job<T: Serialize + Sync>(
    queue: &dyn JobQueue,
    channel: &str,
    job: &T,
) -> Result<(), QueueError> {
    let payload = serde_json::to_string(job)?;
    queue.enqueue(channel, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_health_display() {
        let health = QueueHealth {
            connected: true,
            provider: "redis".to_string(),
        };
        let display = format!("{}", health);
        assert!(display.contains("connected: true"));
        assert!(display.contains("redis"));
    }
}
