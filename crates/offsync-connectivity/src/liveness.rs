//! Peer-liveness supervisor, master-side: wires
//! [`offsync_store::PeerRegistry`] to the 5-minute janitor task.

use std::time::Duration;

use offsync_store::{PeerRegistry, PeerSession, SyncOutcome};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;

const JANITOR_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct PeerLivenessSupervisor {
    registry: PeerRegistry,
    shutdown: watch::Sender<bool>,
}

impl PeerLivenessSupervisor {
    pub fn new(registry: PeerRegistry) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { registry, shutdown }
    }

    pub async fn record_activity(&self, peer_id: &str) -> Result<()> {
        self.registry.record_activity(peer_id).await?;
        Ok(())
    }

    pub async fn update_sync_status(&self, peer_id: &str, outcome: SyncOutcome, count: i64) -> Result<()> {
        self.registry.update_sync_status(peer_id, outcome, count).await?;
        Ok(())
    }

    pub async fn get_status(&self, peer_id: &str) -> Result<Option<PeerSession>> {
        Ok(self.registry.get_status(peer_id).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<PeerSession>> {
        Ok(self.registry.list_all().await?)
    }

    /// Spawns the 5-minute janitor task that flips stale peers
    /// offline. Cancelled via [`PeerLivenessSupervisor::shutdown`].
    pub fn spawn_janitor(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = std::sync::Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match supervisor.registry.mark_offline_peers().await {
                            Ok(flipped) if flipped > 0 => info!(flipped, "janitor marked peers offline"),
                            Ok(_) => {}
                            Err(err) => debug!(error = %err, "peer janitor run failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("peer janitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_store::Store;

    #[tokio::test]
    async fn record_activity_and_get_status_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let supervisor = PeerLivenessSupervisor::new(store.peers());
        supervisor.record_activity("ship-a").await.unwrap();

        let status = supervisor.get_status("ship-a").await.unwrap().unwrap();
        assert!(status.is_online);
    }
}
