//! In-memory fakes for the bus traits, shared across this workspace's
//! test suites so none of them need a running Kafka broker. Gated
//! behind the `test-util` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use offsync_types::SyncMessage;

use crate::error::{BusError, Result};
use crate::producer::BusProducer;

pub struct FakeProducer {
    pub sent_to_ships: Mutex<Vec<SyncMessage>>,
    pub sent_to_master: Mutex<Vec<SyncMessage>>,
    pub connected: AtomicBool,
}

impl FakeProducer {
    pub fn new(connected: bool) -> Self {
        Self {
            sent_to_ships: Mutex::new(Vec::new()),
            sent_to_master: Mutex::new(Vec::new()),
            connected: AtomicBool::new(connected),
        }
    }
}

#[async_trait]
impl BusProducer for FakeProducer {
    async fn send_to_ships(&self, msg: &SyncMessage) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(BusError::NotConnected);
        }
        self.sent_to_ships.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn send_to_master(&self, msg: &SyncMessage) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(BusError::NotConnected);
        }
        self.sent_to_master.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn send_heartbeat(&self, _peer_id: &str) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(BusError::NotConnected);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// A fixed queue of inbound messages, for driving the consumer loop in
/// tests without a broker.
pub struct FakeConsumer {
    pub queue: Mutex<VecDeque<SyncMessage>>,
}

impl FakeConsumer {
    pub fn new(messages: Vec<SyncMessage>) -> Self {
        Self {
            queue: Mutex::new(messages.into()),
        }
    }

    pub fn next_message(&self) -> Option<SyncMessage> {
        self.queue.lock().unwrap().pop_front()
    }
}
