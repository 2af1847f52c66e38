use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;

/// The broker's unit of transport.
///
/// `payload` is an opaque JSON object — its shape depends on `message_type` and is
/// interpreted only by the registered handler. `priority` selects which of the three
/// live queues (`high`/`normal`/`low`) a Message is routed to at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub source: String,
    pub target: String,
    pub message_type: String,
    pub payload: Value,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub attempt: u32,
    pub max_attempts: u32,
    pub correlation_id: Option<MessageId>,
    pub metadata: Option<HashMap<String, Value>>,
}

impl Message {
    /// Construct a new Message at `attempt = 0`, assigning a fresh id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        message_type: impl Into<String>,
        payload: Value,
        priority: u8,
        ttl_secs: u64,
        max_attempts: u32,
        correlation_id: Option<MessageId>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Self {
        Self {
            id: MessageId::new_v4(),
            source: source.into(),
            target: target.into(),
            message_type: message_type.into(),
            payload,
            priority: priority.min(10),
            created_at: Utc::now(),
            ttl_secs,
            attempt: 0,
            max_attempts,
            correlation_id,
            metadata,
        }
    }

    /// The queue this Message is routed to, by its priority band.
    pub fn queue(&self) -> Queue {
        Queue::for_priority(self.priority)
    }

    /// Whether `now - created_at > ttl` — the Message must be dead-lettered with `expired`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() > self.ttl_secs as i64
    }

    /// A copy with `attempt` incremented by one, id and everything else preserved.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next
    }

    pub fn exceeds_max_attempts(&self) -> bool {
        self.attempt > self.max_attempts
    }
}

/// The four mandatory queues. Draining across `High`/`Normal`/`Low` is strict-priority;
/// `DeadLetter` is append-only and never drained by the delivery loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    High,
    Normal,
    Low,
    DeadLetter,
}

impl Queue {
    pub fn for_priority(priority: u8) -> Self {
        match priority {
            8..=10 => Queue::High,
            4..=7 => Queue::Normal,
            _ => Queue::Low,
        }
    }

    /// Queues polled by the delivery loop, in strict-priority order.
    pub fn live_queues() -> [Queue; 3] {
        [Queue::High, Queue::Normal, Queue::Low]
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Queue::High => "queue:high",
            Queue::Normal => "queue:normal",
            Queue::Low => "queue:low",
            Queue::DeadLetter => "queue:dead_letter",
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key_name())
    }
}

/// Structured reason recorded alongside a dead-lettered Message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    NotForUs,
    Expired,
    MaxAttemptsExceeded,
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadLetterReason::NotForUs => write!(f, "not_for_us"),
            DeadLetterReason::Expired => write!(f, "expired"),
            DeadLetterReason::MaxAttemptsExceeded => write!(f, "max_attempts_exceeded"),
        }
    }
}

/// An envelope around a dead-lettered Message plus the reason it was quarantined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message: Message,
    pub reason: DeadLetterReason,
    pub dead_lettered_at: DateTime<Utc>,
}

/// `priority` is stored as a raw `u8` on the wire (matching the source's integer scale);
/// this enum exists for call sites that want named bands instead of magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Representative value within the band, usable as `Message::new`'s `priority` argument.
    pub fn value(self) -> u8 {
        match self {
            Priority::High => 9,
            Priority::Normal => 5,
            Priority::Low => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_routing_by_priority_band() {
        assert_eq!(Queue::for_priority(10), Queue::High);
        assert_eq!(Queue::for_priority(8), Queue::High);
        assert_eq!(Queue::for_priority(7), Queue::Normal);
        assert_eq!(Queue::for_priority(4), Queue::Normal);
        assert_eq!(Queue::for_priority(3), Queue::Low);
        assert_eq!(Queue::for_priority(0), Queue::Low);
    }

    #[test]
    fn next_attempt_preserves_id_bumps_attempt() {
        let msg = Message::new("ingest", "ingest", "chunk", serde_json::json!({}), 5, 3600, 3, None, None);
        let retried = msg.next_attempt();
        assert_eq!(retried.id, msg.id);
        assert_eq!(retried.attempt, 1);
        assert_eq!(msg.attempt, 0);
    }

    #[test]
    fn exceeds_max_attempts_at_boundary() {
        let mut msg = Message::new("a", "b", "t", serde_json::json!({}), 5, 60, 2, None, None);
        msg.attempt = 2;
        assert!(!msg.exceeds_max_attempts());
        msg.attempt = 3;
        assert!(msg.exceeds_max_attempts());
    }

    #[test]
    fn expiry_uses_created_at_and_ttl() {
        let msg = Message::new("a", "b", "t", serde_json::json!({}), 5, 10, 3, None, None);
        assert!(!msg.is_expired(msg.created_at + chrono::Duration::seconds(5)));
        assert!(msg.is_expired(msg.created_at + chrono::Duration::seconds(11)));
    }

    #[test]
    fn roundtrip_message_json() {
        let msg = Message::new(
            "chat-service",
            "embedding-service",
            "embed_batch",
            serde_json::json!({"texts": ["a", "b"]}),
            5,
            3600,
            3,
            Some(MessageId::new_v4()),
            None,
        );
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.correlation_id, msg.correlation_id);
    }
}
