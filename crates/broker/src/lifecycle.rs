//! Shutdown coordination shared by the broker's own tasks and by the worker
//! binaries (`ingest-worker`, `query-worker`) that embed a [`crate::Broker`].

use tokio::sync::watch;
use tracing::info;

/// A sticky shutdown flag: once triggered, every past and future call to
/// [`ShutdownHandle::wait`] resolves immediately. Built on `watch` rather than
/// `Notify` so a trigger that fires before a worker starts waiting is never lost.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Resolve once shutdown has been triggered, immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Trigger shutdown. Idempotent; safe to call from multiple places.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Spawn a task that triggers this handle on SIGINT/SIGTERM (Ctrl+C off Unix).
    /// Call once per process — typically from the worker binary's `main`.
    pub fn spawn_signal_listener(&self) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            os_signal().await;
            info!("shutdown signal received");
            handle.trigger();
        })
    }
}

async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn programmatic_trigger_resolves_wait() {
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move {
            waiter.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("wait should resolve after trigger")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_after_trigger_resolves_immediately() {
        let handle = ShutdownHandle::new();
        handle.trigger();
        tokio::time::timeout(Duration::from_millis(50), handle.wait())
            .await
            .expect("wait should resolve immediately once already triggered");
    }
}
