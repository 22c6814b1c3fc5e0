//! Message bus producer and consumer for the offline-sync replication
//! engine. Backed by `rdkafka` against the two logical
//! topics `master-updates` / `ship-updates`.

mod backoff;
mod consumer;
mod error;
mod producer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backoff::BackoffPolicy;
pub use consumer::{BusConsumer, Delivery, KafkaConsumer};
pub use error::{BusError, Result};
pub use producer::{BusProducer, KafkaProducer};
