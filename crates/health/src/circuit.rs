use chrono::{DateTime, Utc};
use pdfchat_core::CircuitState;
use serde::{Deserialize, Serialize};

/// Pure state-machine record for one outbound dependency's circuit breaker.
///
/// Completes the three-state machine left half-built in the original broker, which
/// tracked `failure_count`/`state` fields but never coded the `open → half_open` or
/// `half_open → closed/open` transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Default for CircuitRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
        }
    }
}

impl CircuitRecord {
    pub fn closed() -> Self {
        Self::default()
    }

    /// Whether a call to the dependency may proceed right now. An `Open` circuit
    /// transitions itself to `HalfOpen` once `recovery_timeout` has elapsed, granting
    /// exactly one trial call; callers must follow up with `record_success`/`record_failure`.
    pub fn allow_call(&mut self, now: DateTime<Utc>, recovery_timeout_secs: u64) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => match self.opened_at {
                Some(opened_at)
                    if now.signed_duration_since(opened_at).num_seconds()
                        >= recovery_timeout_secs as i64 =>
                {
                    self.state = CircuitState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>, failure_threshold: u32) {
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
            }
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_opens_at_failure_threshold() {
        let mut c = CircuitRecord::closed();
        let now = Utc::now();
        for _ in 0..4 {
            c.record_failure(now, 5);
            assert_eq!(c.state, CircuitState::Closed);
        }
        c.record_failure(now, 5);
        assert_eq!(c.state, CircuitState::Open);
        assert_eq!(c.opened_at, Some(now));
    }

    #[test]
    fn open_fails_fast_until_recovery_timeout() {
        let mut c = CircuitRecord {
            state: CircuitState::Open,
            failure_count: 5,
            opened_at: Some(Utc::now()),
        };
        let opened_at = c.opened_at.unwrap();
        assert!(!c.allow_call(opened_at + chrono::Duration::seconds(59), 60));
        assert_eq!(c.state, CircuitState::Open);
        assert!(c.allow_call(opened_at + chrono::Duration::seconds(61), 60));
        assert_eq!(c.state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes() {
        let mut c = CircuitRecord {
            state: CircuitState::HalfOpen,
            failure_count: 5,
            opened_at: Some(Utc::now()),
        };
        c.record_success();
        assert_eq!(c.state, CircuitState::Closed);
        assert_eq!(c.failure_count, 0);
        assert!(c.opened_at.is_none());
    }

    #[test]
    fn half_open_failure_reopens_and_resets_opened_at() {
        let mut c = CircuitRecord {
            state: CircuitState::HalfOpen,
            failure_count: 5,
            opened_at: Some(Utc::now() - chrono::Duration::seconds(120)),
        };
        let now = Utc::now();
        c.record_failure(now, 5);
        assert_eq!(c.state, CircuitState::Open);
        assert_eq!(c.opened_at, Some(now));
    }
}
