use std::collections::HashMap;

use chrono::Utc;
use pdfchat_core::ServiceHealth;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use crate::circuit::CircuitRecord;
use crate::error::HealthError;

const HEALTH_HASH_KEY: &str = "service:health";
const HEALTH_BROADCAST_CHANNEL: &str = "health:updates";
const CIRCUIT_HASH_KEY: &str = "circuit:state";

/// The Health table: `service:health` is a Redis hash keyed by service name.
/// Written only by the owning service's health loop; any service may read any row.
#[derive(Clone)]
pub struct HealthRegistry {
    conn: ConnectionManager,
}

impl HealthRegistry {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Write this service's own health row and publish it on the broadcast channel.
    pub async fn report(&self, health: &ServiceHealth) -> Result<(), HealthError> {
        let json = serde_json::to_string(health)?;
        let mut conn = self.conn.clone();
        let _: () = conn.hset(HEALTH_HASH_KEY, &health.service_name, &json).await?;
        let _: () = conn.publish(HEALTH_BROADCAST_CHANNEL, &json).await?;
        info!(service = %health.service_name, status = ?health.status, "health reported");
        Ok(())
    }

    pub async fn get(&self, service_name: &str) -> Result<Option<ServiceHealth>, HealthError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(HEALTH_HASH_KEY, service_name).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    pub async fn get_all(&self) -> Result<HashMap<String, ServiceHealth>, HealthError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(HEALTH_HASH_KEY).await?;
        let mut out = HashMap::with_capacity(raw.len());
        for (name, json) in raw {
            match serde_json::from_str::<ServiceHealth>(&json) {
                Ok(health) => {
                    out.insert(name, health);
                }
                Err(e) => warn!(service = %name, error = %e, "malformed health record skipped"),
            }
        }
        Ok(out)
    }
}

/// The Circuit table: one row per outbound dependency, stored under `circuit:state`.
/// The broker (or an orchestrator) is the sole writer of a given row.
#[derive(Clone)]
pub struct CircuitRegistry {
    conn: ConnectionManager,
    failure_threshold: u32,
    recovery_timeout_secs: u64,
}

impl CircuitRegistry {
    pub fn new(conn: ConnectionManager, failure_threshold: u32, recovery_timeout_secs: u64) -> Self {
        Self {
            conn,
            failure_threshold,
            recovery_timeout_secs,
        }
    }

    async fn load(&self, dependency: &str) -> Result<CircuitRecord, HealthError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(CIRCUIT_HASH_KEY, dependency).await?;
        Ok(match raw {
            Some(json) => serde_json::from_str(&json)?,
            None => CircuitRecord::closed(),
        })
    }

    async fn save(&self, dependency: &str, record: &CircuitRecord) -> Result<(), HealthError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let _: () = conn.hset(CIRCUIT_HASH_KEY, dependency, &json).await?;
        Ok(())
    }

    /// Whether a call to `dependency` may proceed. Transitions `Open -> HalfOpen` in
    /// place when `recovery_timeout` has elapsed, persisting the new state immediately.
    pub async fn allow_call(&self, dependency: &str) -> Result<bool, HealthError> {
        let mut record = self.load(dependency).await?;
        let allowed = record.allow_call(Utc::now(), self.recovery_timeout_secs);
        self.save(dependency, &record).await?;
        Ok(allowed)
    }

    pub async fn record_success(&self, dependency: &str) -> Result<(), HealthError> {
        let mut record = self.load(dependency).await?;
        record.record_success();
        self.save(dependency, &record).await
    }

    pub async fn record_failure(&self, dependency: &str) -> Result<(), HealthError> {
        let mut record = self.load(dependency).await?;
        record.record_failure(Utc::now(), self.failure_threshold);
        if record.state == pdfchat_core::CircuitState::Open {
            warn!(dependency, "circuit opened");
        }
        self.save(dependency, &record).await
    }

    pub async fn state(&self, dependency: &str) -> Result<CircuitRecord, HealthError> {
        self.load(dependency).await
    }
}
