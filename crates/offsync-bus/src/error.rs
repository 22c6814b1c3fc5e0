//! Bus error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not connected")]
    NotConnected,

    #[error("consumer closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BusError>;
