//! Bus consumer: subscribes to the opposite direction's topic
//! and hands decoded [`SyncMessage`]s to the caller.
//!
//! Schema verification, dedup, loop-prevention flag scoping, and
//! dispatch to the apply path are the caller's responsibility
//! (`offsync-resolver`) — this crate only owns decode + ack.

use async_trait::async_trait;
use offsync_config::BusConfig;
use offsync_types::SyncMessage;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;

use crate::error::{BusError, Result};

/// A single delivered message plus the means to acknowledge it.
/// The consumer always acknowledges — after a successful apply or
/// after dead-lettering — never to retry an unmodified message.
pub struct Delivery {
    pub message: SyncMessage,
    offset_token: OffsetToken,
}

struct OffsetToken {
    topic: String,
    partition: i32,
    offset: i64,
}

#[async_trait]
pub trait BusConsumer: Send + Sync {
    /// Waits for and decodes the next message. Returns `Ok(None)` if
    /// the consumer was closed during the shutdown sequence.
    async fn recv(&self) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery, committing its offset.
    async fn ack(&self, delivery: Delivery) -> Result<()>;
}

/// `rdkafka`-backed consumer of one logical topic (master consumes
/// `ship-updates`, replica consumes `master-updates`).
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    pub fn connect(config: &BusConfig, topic: &str, group_id: &str) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
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

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[topic])?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl BusConsumer for KafkaConsumer {
    async fn recv(&self) -> Result<Option<Delivery>> {
        let borrowed = self.consumer.recv().await?;
        let topic = borrowed.topic().to_string();
        let partition = borrowed.partition();
        let offset = borrowed.offset();

        let payload = borrowed.payload().ok_or(BusError::Closed)?;
        let message: SyncMessage = serde_json::from_slice(payload)?;

        Ok(Some(Delivery {
            message,
            offset_token: OffsetToken {
                topic,
                partition,
                offset,
            },
        }))
    }

    async fn ack(&self, delivery: Delivery) -> Result<()> {
        use rdkafka::topic_partition_list::TopicPartitionList;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &delivery.offset_token.topic,
            delivery.offset_token.partition,
            rdkafka::Offset::Offset(delivery.offset_token.offset + 1),
        )?;
        self.consumer.commit(&tpl, rdkafka::consumer::CommitMode::Async)?;
        Ok(())
    }
}
