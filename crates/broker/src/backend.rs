use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pdfchat_core::message::Queue;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::BrokerError;

/// Atomic queue/hash/pub-sub operations the Broker needs from its backend.
///
/// Message queues are manipulated only through these calls — never read-modify-write —
/// matching §5's single-writer discipline. A real deployment uses [`RedisBackend`];
/// tests use [`FakeBackend`] so the suite does not require a live Redis server.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Push a serialized Message onto the tail of `queue`.
    async fn push(&self, queue: Queue, payload: String) -> Result<(), BrokerError>;

    /// Pop from the head of the first non-empty queue in `queues`, honoring the given
    /// priority order, blocking up to `timeout` before returning `None`.
    async fn pop_blocking(
        &self,
        queues: &[Queue],
        timeout: Duration,
    ) -> Result<Option<(Queue, String)>, BrokerError>;

    /// Number of entries currently queued.
    async fn len(&self, queue: Queue) -> Result<u64, BrokerError>;

    /// Publish `payload` on a named broadcast channel (health updates, acks-by-target, etc).
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    /// Round-trip latency to the backend, used by the health loop.
    async fn ping(&self) -> Result<Duration, BrokerError>;
}

// ── Redis backend ─────────────────────────────────────────────

pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn push(&self, queue: Queue, payload: String) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(queue.key_name(), payload).await?;
        Ok(())
    }

    async fn pop_blocking(
        &self,
        queues: &[Queue],
        timeout: Duration,
    ) -> Result<Option<(Queue, String)>, BrokerError> {
        let mut conn = self.conn.clone();
        let keys: Vec<&str> = queues.iter().map(Queue::key_name).collect();
        let timeout_secs = timeout.as_secs_f64().max(0.01);
        let result: Option<(String, String)> = conn.brpop(&keys, timeout_secs).await?;
        Ok(result.and_then(|(key, payload)| {
            queues
                .iter()
                .find(|q| q.key_name() == key)
                .map(|q| (*q, payload))
        }))
    }

    async fn len(&self, queue: Queue) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(queue.key_name()).await?;
        Ok(len)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<Duration, BrokerError> {
        let mut conn = self.conn.clone();
        let start = Instant::now();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(start.elapsed())
    }
}

// ── Fake backend (test tooling) ───────────────────────────────

/// In-process backend used by tests: plain FIFO deques per queue, no real timeout
/// semantics on an empty pop (returns `None` immediately rather than blocking), and an
/// always-successful ping with a caller-controlled artificial latency.
#[derive(Default)]
pub struct FakeBackend {
    queues: Mutex<HashMap<Queue, std::collections::VecDeque<String>>>,
    published: Mutex<Vec<(String, String)>>,
    ping_latency: Duration,
    fail_ping: Arc<std::sync::atomic::AtomicBool>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ping_latency(mut self, latency: Duration) -> Self {
        self.ping_latency = latency;
        self
    }

    /// Toggle ping failures, used to drive the circuit breaker in tests.
    pub fn set_ping_failing(&self, failing: bool) {
        self.fail_ping.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn published_messages(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn push(&self, queue: Queue, payload: String) -> Result<(), BrokerError> {
        self.queues.lock().await.entry(queue).or_default().push_back(payload);
        Ok(())
    }

    async fn pop_blocking(
        &self,
        queues: &[Queue],
        _timeout: Duration,
    ) -> Result<Option<(Queue, String)>, BrokerError> {
        let mut guard = self.queues.lock().await;
        for queue in queues {
            if let Some(entries) = guard.get_mut(queue) {
                if let Some(payload) = entries.pop_front() {
                    return Ok(Some((*queue, payload)));
                }
            }
        }
        Ok(None)
    }

    async fn len(&self, queue: Queue) -> Result<u64, BrokerError> {
        Ok(self
            .queues
            .lock()
            .await
            .get(&queue)
            .map(|q| q.len() as u64)
            .unwrap_or(0))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        self.published.lock().await.push((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn ping(&self) -> Result<Duration, BrokerError> {
        if self.fail_ping.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BrokerError::Core(pdfchat_core::Error::BackendUnavailable(
                "fake backend ping failure".into(),
            )));
        }
        Ok(self.ping_latency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_backend_respects_priority_order() {
        let backend = FakeBackend::new();
        backend.push(Queue::Normal, "n1".into()).await.unwrap();
        backend.push(Queue::High, "h1".into()).await.unwrap();

        let (queue, payload) = backend
            .pop_blocking(&Queue::live_queues(), Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue, Queue::High);
        assert_eq!(payload, "h1");
    }

    #[tokio::test]
    async fn fake_backend_empty_returns_none() {
        let backend = FakeBackend::new();
        let popped = backend
            .pop_blocking(&Queue::live_queues(), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(popped.is_none());
    }
}
