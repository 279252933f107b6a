//! Backend health polling.
//!
//! Periodically probes the backend and flips the store's online flag. The
//! engine's fetch and send paths do not consult the flag directly (they
//! degrade on their own errors); it exists for views that want to show
//! connectivity.

use crate::engine::ChatEngine;
use std::time::Duration;

impl ChatEngine {
    /// Starts the periodic health poll. A second start while one is
    /// running is ignored.
    pub async fn start_health_monitor(&self, interval: Duration) {
        let mut handle = self.health_handle.lock().await;
        if handle.is_some() {
            tracing::warn!("[HealthMonitor] Already running, skipping");
            return;
        }

        let api = self.api().clone();
        let store = self.store().clone();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let online = match api.health().await {
                    Ok(status) => status.is_healthy(),
                    Err(e) => {
                        tracing::debug!("[HealthMonitor] Probe failed: {}", e);
                        false
                    }
                };
                if online != store.is_online().await {
                    tracing::info!("[HealthMonitor] Backend online: {}", online);
                }
                store.set_online(online).await;
            }
        }));
    }

    /// Stops the health poll. Part of engine teardown.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.health_handle.lock().await.take() {
            handle.abort();
        }
    }
}
