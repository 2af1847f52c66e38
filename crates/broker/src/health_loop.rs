//! Periodic health-ping loop: measures backend latency, classifies
//! healthy/degraded/unhealthy, and reports through [`pdfchat_health::HealthRegistry`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use pdfchat_core::{HealthStatus, ServiceHealth};
use pdfchat_health::HealthRegistry;
use tracing::warn;

use crate::backend::Backend;
use crate::lifecycle::ShutdownHandle;

/// Response time above which a reachable backend is reported `Degraded` rather than
/// `Healthy`, per the broker's health contract.
const DEGRADED_THRESHOLD_MS: u64 = 1000;

pub struct HealthLoop {
    backend: Arc<dyn Backend>,
    registry: HealthRegistry,
    service_name: String,
    interval: Duration,
    handler_count: Arc<AtomicUsize>,
}

impl HealthLoop {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: HealthRegistry,
        service_name: impl Into<String>,
        interval: Duration,
        handler_count: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            backend,
            registry,
            service_name: service_name.into(),
            interval,
            handler_count,
        }
    }

    /// Spawn the loop; it pings once immediately, then on every tick, until `shutdown` fires.
    pub fn spawn(self, shutdown: ShutdownHandle) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut error_count: u64 = 0;
            let mut ticker = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(&mut error_count).await;
                    }
                    _ = shutdown.wait() => {
                        break;
                    }
                }
            }
        })
    }

    async fn tick(&self, error_count: &mut u64) {
        let handler_count = self.handler_count.load(Ordering::Relaxed);
        let health = match self.backend.ping().await {
            Ok(latency) => {
                let response_time_ms = latency.as_millis() as u64;
                let status = if response_time_ms > DEGRADED_THRESHOLD_MS {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                ServiceHealth {
                    service_name: self.service_name.clone(),
                    status,
                    last_heartbeat: Utc::now(),
                    response_time_ms,
                    error_count: *error_count,
                    handler_count,
                }
            }
            Err(e) => {
                *error_count += 1;
                warn!(service = %self.service_name, error = %e, "health ping failed");
                ServiceHealth {
                    service_name: self.service_name.clone(),
                    status: HealthStatus::Unhealthy,
                    last_heartbeat: Utc::now(),
                    response_time_ms: 0,
                    error_count: *error_count,
                    handler_count,
                }
            }
        };

        if let Err(e) = self.registry.report(&health).await {
            warn!(service = %self.service_name, error = %e, "failed to report health");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;

    #[tokio::test]
    async fn degrades_above_threshold() {
        let backend: Arc<dyn Backend> = Arc::new(
            FakeBackend::new().with_ping_latency(Duration::from_millis(1500)),
        );
        let latency = backend.ping().await.unwrap();
        assert!(latency.as_millis() as u64 > DEGRADED_THRESHOLD_MS);
    }

    #[tokio::test]
    async fn ping_failure_surfaces_as_error() {
        let backend = FakeBackend::new();
        backend.set_ping_failing(true);
        assert!(backend.ping().await.is_err());
    }
}
