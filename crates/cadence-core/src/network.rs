//! Network connectivity monitor.
//!
//! The engine trusts exactly one connectivity signal. Platform glue (browser
//! online/offline events, OS reachability callbacks) feeds transitions in
//! through [`NetworkMonitor::set_online`]; the orchestrator and the engine's
//! background triggers observe the signal through a watch channel.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Observes connectivity transitions and exposes an online/offline signal
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Create a monitor with the given initial connectivity state
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Current connectivity state
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Feed a connectivity transition into the monitor.
    ///
    /// Subscribers are notified only on actual transitions; repeating the
    /// current state is a no-op.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
        if changed {
            info!(online, "Network connectivity changed");
        }
    }

    /// Subscribe to connectivity transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Wait until the monitor reports online.
    ///
    /// Returns immediately when already online.
    pub async fn wait_until_online(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
