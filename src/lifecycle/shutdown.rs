//! Shutdown coordination.

use tokio::sync::watch;

/// Coordinator for stopping background tasks after the engine exits.
///
/// Backed by a watch channel, so listeners that subscribe after the trigger
/// still observe it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side held by each long-running task.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown is triggered or the coordinator is dropped.
    ///
    /// Cancel-safe, so it can sit in a `select!` loop.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();

        let mut listener = shutdown.subscribe();
        tokio::time::timeout(Duration::from_secs(1), listener.wait())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropping_coordinator_releases_listeners() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), listener.wait())
            .await
            .unwrap();
    }
}
