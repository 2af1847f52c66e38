use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness classification written by a service's own health loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// A row in the Health table: one per service, written only by the owning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service_name: String,
    pub status: HealthStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error_count: u64,
    pub handler_count: usize,
}

impl ServiceHealth {
    /// Staleness is defined relative to `2 * health_interval`.
    pub fn is_stale(&self, now: DateTime<Utc>, health_interval_secs: u64) -> bool {
        let age = now.signed_duration_since(self.last_heartbeat);
        age.num_seconds() > 2 * health_interval_secs as i64
    }
}

/// A row in the Circuit table: one per outbound dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_relative_to_double_interval() {
        let health = ServiceHealth {
            service_name: "ingest-worker".into(),
            status: HealthStatus::Healthy,
            last_heartbeat: Utc::now(),
            response_time_ms: 10,
            error_count: 0,
            handler_count: 3,
        };
        assert!(!health.is_stale(health.last_heartbeat + chrono::Duration::seconds(59), 30));
        assert!(health.is_stale(health.last_heartbeat + chrono::Duration::seconds(61), 30));
    }
}
