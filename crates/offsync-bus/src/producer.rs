//! Bus producer: publishes to `master-updates` / `ship-updates`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offsync_config::BusConfig;
use offsync_types::SyncMessage;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::error::{BusError, Result};

/// Seam between the sync engine and the underlying transport. Kept as
/// a trait so the apply path, interceptor, and tests can be exercised
/// against a fake producer without a running broker.
#[async_trait]
pub trait BusProducer: Send + Sync {
    async fn send_to_ships(&self, msg: &SyncMessage) -> Result<()>;
    async fn send_to_master(&self, msg: &SyncMessage) -> Result<()>;
    async fn send_heartbeat(&self, peer_id: &str) -> Result<()>;
    /// Non-blocking: reflects the last known connection state, not a
    /// live probe.
    fn is_connected(&self) -> bool;
}

/// `rdkafka`-backed producer for the two logical topics.
pub struct KafkaProducer {
    producer: FutureProducer,
    master_updates_topic: String,
    ship_updates_topic: String,
    connected: Arc<AtomicBool>,
}

impl KafkaProducer {
    /// Connects lazily: `rdkafka`'s producer handle is created
    /// eagerly, but the actual TCP connection to a broker happens on
    /// first use.
    pub fn connect(config: &BusConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("message.timeout.ms", "30000")
            .set("socket.connection.setup.timeout.ms", "60000");

        if config.tls {
            client_config.set("security.protocol", "SASL_SSL");
        }
        if let Some(auth) = &config.auth {
            client_config
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", &auth.username)
                .set("sasl.password", &auth.password);
        }

        let producer: FutureProducer = client_config.create()?;

        Ok(Self {
            producer,
            master_updates_topic: config.topics.master_updates.clone(),
            ship_updates_topic: config.topics.ship_updates.clone(),
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    async fn publish(&self, topic: &str, key: &str, msg: &SyncMessage) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        let record = FutureRecord::to(topic).key(key).payload(&payload);

        match self
            .producer
            .send(record, Duration::from_secs(30))
            .await
        {
            Ok(_) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err((err, _)) => {
                self.connected.store(false, Ordering::Relaxed);
                Err(BusError::Kafka(err))
            }
        }
    }
}

#[async_trait]
impl BusProducer for KafkaProducer {
    async fn send_to_ships(&self, msg: &SyncMessage) -> Result<()> {
        self.publish(&self.master_updates_topic, &msg.content_id, msg).await
    }

    async fn send_to_master(&self, msg: &SyncMessage) -> Result<()> {
        self.publish(&self.ship_updates_topic, &msg.content_id, msg).await
    }

    async fn send_heartbeat(&self, peer_id: &str) -> Result<()> {
        let heartbeat = SyncMessage {
            message_id: format!("heartbeat-{peer_id}-{}", chrono::Utc::now().timestamp_millis()),
            ship_id: peer_id.to_string(),
            timestamp: chrono::Utc::now(),
            operation: offsync_types::SyncOperation::Update,
            content_type: "__heartbeat__".to_string(),
            content_id: peer_id.to_string(),
            version: 0,
            data: None,
            locale: None,
            file_records: None,
        };
        // Heartbeats are only ever sent by replicas today, and the
        // master is the side that needs to observe liveness, so they
        // go out on the topic the master consumes.
        self.publish(&self.ship_updates_topic, peer_id, &heartbeat).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProducer;

    #[tokio::test]
    async fn fake_producer_rejects_sends_while_disconnected() {
        let producer = FakeProducer::new(false);
        let msg = SyncMessage {
            message_id: "m1".into(),
            ship_id: "ship-a".into(),
            timestamp: chrono::Utc::now(),
            operation: offsync_types::SyncOperation::Create,
            content_type: "t".into(),
            content_id: "e1".into(),
            version: 1,
            data: None,
            locale: None,
            file_records: None,
        };

        assert!(producer.send_to_master(&msg).await.is_err());
        assert!(producer.sent_to_master.lock().unwrap().is_empty());
    }
}
