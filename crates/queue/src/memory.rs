//! In-process queue backend.
//!
//! Backs the same [`JobQueue`] contract with per-channel `VecDeque`s. Used
//! by tests and single-process runs where a broker would be overhead.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::client::{JobQueue, QueueHealth};
use crate::error::QueueError;

#[derive(Default)]
struct Channels {
    queues: HashMap<String, VecDeque<String>>,
}

/// In-memory job queue.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    channels: Arc<Mutex<Channels>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads currently waiting on a channel.
    pub async fn depth(&self, channel: &str) -> usize {
        let inner = self.channels.lock().await;
        inner.queues.get(channel).map(|q| q.len()).unwrap_or(0)
    }

    async fn try_pop(&self, channel: &str) -> Option<String> {
        let mut inner = self.channels.lock().await;
        inner.queues.get_mut(channel).and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, channel: &str, payload: &str) -> Result<(), QueueError> {
        let mut inner = self.channels.lock().await;
        inner
            .queues
            .entry(channel.to_string())
            .or_default()
            .push_back(payload.to_string());
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so an enqueue between
            // the check and the await is not missed.
            let notified = self.notify.notified();
            if let Some(payload) = self.try_pop(channel).await {
                return Ok(Some(payload));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            provider: "memory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        queue.enqueue("jobs", "first").await.unwrap();
        queue.enqueue("jobs", "second").await.unwrap();

        let a = queue.dequeue("jobs", Duration::from_millis(10)).await.unwrap();
        let b = queue.dequeue("jobs", Duration::from_millis(10)).await.unwrap();
        assert_eq!(a.as_deref(), Some("first"));
        assert_eq!(b.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_dequeue_timeout_on_empty() {
        let queue = MemoryQueue::new();
        let got = queue.dequeue("jobs", Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let queue = MemoryQueue::new();
        queue.enqueue("ingest_jobs", "a").await.unwrap();

        let other = queue
            .dequeue("forecast_jobs", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(other.is_none());
        assert_eq!(queue.depth("ingest_jobs").await, 1);
    }

    #[tokio::test]
    async fn test_blocked_consumer_woken_by_enqueue() {
        let queue = MemoryQueue::new();
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.dequeue("jobs", Duration::from_secs(5)).await.unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("jobs", "wake").await.unwrap();

        let got = consumer.await.unwrap();
        assert_eq!(got.as_deref(), Some("wake"));
    }

    #[tokio::test]
    async fn test_each_payload_delivered_once() {
        let queue = MemoryQueue::new();
        for i in 0..10 {
            queue.enqueue("jobs", &format!("job-{i}")).await.unwrap();
        }

        let mut seen = Vec::new();
        while let Some(p) = queue.dequeue("jobs", Duration::from_millis(5)).await.unwrap() {
            seen.push(p);
        }
        seen.sort();
        assert_eq!(seen.len(), 10);
        seen.dedup();
        assert_eq!(seen.len(), 10);
    }
}
