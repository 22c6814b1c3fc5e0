//! Connectivity monitor, replica-side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use offsync_bus::BusProducer;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::state::ConnectivityState;

/// Fired once on every false→true connectivity transition.
#[async_trait]
pub trait ReconnectCallback: Send + Sync {
    async fn on_reconnect(&self);
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ConnectivityMonitor {
    producer: Arc<dyn BusProducer>,
    peer_id: String,
    health_url: Option<String>,
    http: reqwest::Client,
    state: Mutex<ConnectivityState>,
    callbacks: Mutex<Vec<Arc<dyn ReconnectCallback>>>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new(producer: Arc<dyn BusProducer>, peer_id: impl Into<String>, health_url: Option<String>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            producer,
            peer_id: peer_id.into(),
            health_url,
            http: reqwest::Client::new(),
            state: Mutex::new(ConnectivityState::default()),
            callbacks: Mutex::new(Vec::new()),
            shutdown,
            started: AtomicBool::new(false),
        }
    }

    pub fn register_reconnect_callback(&self, callback: Arc<dyn ReconnectCallback>) {
        self.callbacks.lock().unwrap().push(callback);
    }

    pub fn state(&self) -> ConnectivityState {
        self.state.lock().unwrap().clone()
    }

    /// Probes the bus (and, if configured, a master HTTP health
    /// endpoint) with a bounded timeout. Fires reconnect callbacks on
    /// a false→true transition.
    pub async fn check_connectivity(&self) -> Result<bool> {
        let bus_ok = tokio::time::timeout(PROBE_TIMEOUT, self.producer.send_heartbeat(&self.peer_id))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);

        let http_ok = match &self.health_url {
            Some(url) => tokio::time::timeout(PROBE_TIMEOUT, self.http.get(url).send())
                .await
                .map(|r| r.map(|resp| resp.status().is_success()).unwrap_or(false))
                .unwrap_or(false),
            None => true,
        };

        let success = bus_ok && http_ok;
        let reconnected = self.state.lock().unwrap().record(success, Utc::now());

        if reconnected {
            info!(peer_id = %self.peer_id, "connectivity restored, firing reconnect callbacks");
            let callbacks = self.callbacks.lock().unwrap().clone();
            for callback in callbacks {
                callback.on_reconnect().await;
            }
        } else if !success {
            debug!(peer_id = %self.peer_id, "connectivity probe failed");
        }

        Ok(success)
    }

    /// Schedules periodic probes (default 30s). The returned task is
    /// cancelled by calling [`ConnectivityMonitor::shutdown`]; it never
    /// busy-polls between ticks.
    pub fn start_monitoring(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.started.store(true, Ordering::Relaxed);
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = monitor.check_connectivity().await {
                            warn!(error = %err, "connectivity check errored");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("connectivity monitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Blocks cooperatively until online or `timeout` elapses.
    pub async fn wait_for_connectivity(&self, timeout: Duration, check_interval: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.check_connectivity().await.unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(crate::error::ConnectivityError::WaitTimeout(timeout));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(check_interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_bus::testing::FakeProducer;
    use std::sync::atomic::AtomicUsize;

    struct CountingCallback(Arc<AtomicUsize>);

    #[async_trait]
    impl ReconnectCallback for CountingCallback {
        async fn on_reconnect(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn reconnect_callback_fires_once_on_transition() {
        let producer: Arc<dyn BusProducer> = Arc::new(FakeProducer::new(true));
        let monitor = ConnectivityMonitor::new(producer, "ship-a", None);
        let count = Arc::new(AtomicUsize::new(0));
        monitor.register_reconnect_callback(Arc::new(CountingCallback(count.clone())));

        assert!(monitor.check_connectivity().await.unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(monitor.check_connectivity().await.unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnected_producer_reports_offline() {
        let producer: Arc<dyn BusProducer> = Arc::new(FakeProducer::new(false));
        let monitor = ConnectivityMonitor::new(producer, "ship-a", None);
        assert!(!monitor.check_connectivity().await.unwrap());
        assert!(!monitor.state().is_online);
    }

    #[tokio::test]
    async fn wait_for_connectivity_times_out_when_offline() {
        let producer: Arc<dyn BusProducer> = Arc::new(FakeProducer::new(false));
        let monitor = ConnectivityMonitor::new(producer, "ship-a", None);
        let result = monitor
            .wait_for_connectivity(Duration::from_millis(50), Duration::from_millis(10))
            .await;
        assert!(result.is_err());
    }
}
