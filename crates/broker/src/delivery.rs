//! Worker pool delivery loop: strict-priority polling, dead-lettering, and
//! retry-with-backoff dispatch onto registered handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pdfchat_core::message::{DeadLetterReason, Message, Queue};
use pdfchat_core::Error as CoreError;
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::lifecycle::ShutdownHandle;

const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Run one worker slot until `shutdown` fires. Multiple slots run concurrently,
/// each independently polling the three live queues in priority order.
pub async fn run_worker(broker: Arc<Broker>, worker_id: u32, shutdown: ShutdownHandle) {
    debug!(worker_id, "delivery worker started");
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            popped = broker.backend.pop_blocking(&Queue::live_queues(), POP_TIMEOUT) => {
                match popped {
                    Ok(Some((queue, payload))) => {
                        process_payload(&broker, queue, payload).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(worker_id, error = %e, "pop_blocking failed, backing off");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
    }
    debug!(worker_id, "delivery worker stopped");
}

async fn process_payload(broker: &Arc<Broker>, queue: Queue, payload: String) {
    let message: Message = match serde_json::from_str(&payload) {
        Ok(m) => m,
        Err(e) => {
            warn!(queue = %queue, error = %e, "undecodable message dropped");
            return;
        }
    };

    if let Some(reason) = classify(&broker.config.service_name, &message, Utc::now()) {
        broker.dead_letter(message, reason).await;
        return;
    }

    let handler = {
        let handlers = broker.handlers.read().await;
        handlers.get(&message.message_type).cloned()
    };

    let Some(handler) = handler else {
        warn!(message_type = %message.message_type, "no handler registered, dead-lettering");
        broker.dead_letter(message, DeadLetterReason::NotForUs).await;
        return;
    };

    let message_id = message.id;
    match dispatch(handler, message.clone()).await {
        Ok(()) => {
            if let Some(correlation_id) = message.correlation_id {
                send_ack(broker, &message, correlation_id).await;
            }
        }
        Err(e) => {
            warn!(message_id = %message_id, attempt = message.attempt, error = %e, "handler failed");
            retry_or_dead_letter(broker, message).await;
        }
    }
}

/// Runs `handler` on its own task so a panic inside user code is caught as a
/// `HandlerPanic` failed attempt rather than taking down this worker's delivery loop.
async fn dispatch(handler: crate::broker::MessageHandler, message: Message) -> Result<(), CoreError> {
    match tokio::spawn(async move { handler(message).await }).await {
        Ok(result) => result,
        Err(join_err) => Err(CoreError::HandlerPanic(join_err.to_string())),
    }
}

/// Whether `message` should be dead-lettered before it ever reaches a handler, and why.
fn classify(service_name: &str, message: &Message, now: chrono::DateTime<Utc>) -> Option<DeadLetterReason> {
    if message.target != service_name {
        return Some(DeadLetterReason::NotForUs);
    }
    if message.is_expired(now) {
        return Some(DeadLetterReason::Expired);
    }
    None
}

async fn send_ack(broker: &Arc<Broker>, message: &Message, correlation_id: pdfchat_core::MessageId) {
    let payload = serde_json::json!({"status": "success", "message_id": message.id});
    let result = broker
        .publish(
            broker.config.service_name.clone(),
            message.source.clone(),
            "ack",
            payload,
            5,
            Some(correlation_id),
            None,
            None,
            None,
        )
        .await;
    if let Err(e) = result {
        warn!(message_id = %message.id, error = %e, "failed to publish ack");
    }
}

async fn retry_or_dead_letter(broker: &Arc<Broker>, message: Message) {
    let retried = message.next_attempt();
    if retried.exceeds_max_attempts() {
        broker.dead_letter(retried, DeadLetterReason::MaxAttemptsExceeded).await;
        return;
    }

    let delay = backoff_delay(
        retried.attempt,
        broker.config.backoff_base_secs,
        broker.config.backoff_cap_secs,
    );
    let broker = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = broker.push_message(&retried).await {
            warn!(message_id = %retried.id, error = %e, "failed to requeue after backoff");
        }
    });
}

/// `min(base^attempt, cap)` seconds, never blocking the calling worker — the sleep
/// above happens in a detached task, not inline in the delivery loop.
fn backoff_delay(attempt: u32, base_secs: u64, cap_secs: u64) -> Duration {
    let secs = base_secs.saturating_pow(attempt).min(cap_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rejects_other_targets() {
        let msg = Message::new("a", "other-service", "t", serde_json::json!({}), 5, 3600, 3, None, None);
        assert_eq!(
            classify("this-service", &msg, Utc::now()),
            Some(DeadLetterReason::NotForUs)
        );
    }

    #[test]
    fn classify_rejects_expired() {
        let msg = Message::new("a", "this-service", "t", serde_json::json!({}), 5, 10, 3, None, None);
        let later = msg.created_at + chrono::Duration::seconds(11);
        assert_eq!(classify("this-service", &msg, later), Some(DeadLetterReason::Expired));
    }

    #[test]
    fn classify_accepts_live_message_for_self() {
        let msg = Message::new("a", "this-service", "t", serde_json::json!({}), 5, 3600, 3, None, None);
        assert_eq!(classify("this-service", &msg, Utc::now()), None);
    }

    #[test]
    fn backoff_sequence_matches_spec_example() {
        assert_eq!(backoff_delay(1, 2, 60), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, 2, 60), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, 2, 60), Duration::from_secs(8));
        let total: u64 = [1u32, 2, 3]
            .iter()
            .map(|&a| backoff_delay(a, 2, 60).as_secs())
            .sum();
        assert_eq!(total, 14);
    }

    #[test]
    fn backoff_caps_at_configured_ceiling() {
        assert_eq!(backoff_delay(10, 2, 60), Duration::from_secs(60));
    }
}
