//! The lifecycle interceptor itself.

use std::sync::Arc;

use offsync_bus::BusProducer;
use offsync_store::{OutboundQueue, Store};
use offsync_types::{is_sensitive_field, PeerId, SyncMessage, SyncOperation};
use serde_json::Value;
use tracing::{debug, info};

use crate::debounce::PushDebouncer;
use crate::error::Result;
use crate::event::DocumentEvent;
use crate::origin::{self, Origin};

/// The mode-specific half of the interceptor's step 6/7 behavior.
pub enum Role {
    Replica { peer_id: PeerId, push: PushDebouncer },
    Master { producer: Arc<dyn BusProducer> },
}

pub struct LifecycleInterceptor {
    store: Store,
    /// Empty means every content type is synced.
    allowed_content_types: Vec<String>,
    role: Role,
}

impl LifecycleInterceptor {
    pub fn new(store: Store, allowed_content_types: Vec<String>, role: Role) -> Self {
        Self {
            store,
            allowed_content_types,
            role,
        }
    }

    fn is_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types.is_empty()
            || self.allowed_content_types.iter().any(|t| t == content_type)
    }

    /// The CMS middleware's entry point. Any internal failure is
    /// caught and logged at debug level — this never propagates an
    /// error back to the caller.
    pub async fn on_document_event(&self, event: DocumentEvent) {
        if let Err(err) = self.handle(event).await {
            debug!(error = %err, "lifecycle interceptor failed, CMS operation unaffected");
        }
    }

    async fn handle(&self, event: DocumentEvent) -> Result<()> {
        if !self.is_allowed(&event.content_type) {
            return Ok(());
        }

        if event.is_skippable_bulk() {
            debug!(content_type = %event.content_type, "skipping bulk/array/count result");
            return Ok(());
        }

        let Some(document_id) = event.document_id() else {
            debug!(content_type = %event.content_type, "could not resolve a documentId, skipping");
            return Ok(());
        };

        if !origin::current().is_local() {
            debug!(content_type = %event.content_type, %document_id, "suppressing re-propagation of a peer-originated edit");
            return Ok(());
        }

        let redacted = event.data().map(redact_sensitive_fields);

        match &self.role {
            Role::Replica { peer_id, push } => {
                self.handle_replica(&event, &document_id, redacted, peer_id).await?;
                push.trigger();
            }
            Role::Master { producer } => {
                self.handle_master(&event, &document_id, redacted, producer.as_ref()).await?;
            }
        }

        Ok(())
    }

    async fn handle_replica(
        &self,
        event: &DocumentEvent,
        document_id: &str,
        data: Option<Value>,
        peer_id: &PeerId,
    ) -> Result<()> {
        let version = self
            .store
            .versions()
            .increment_version(&event.content_type, document_id, peer_id)
            .await?;

        self.store
            .replica_queue()
            .enqueue(offsync_store::EnqueueRequest {
                ship_id: peer_id,
                content_type: &event.content_type,
                content_id: document_id,
                operation: event.operation,
                local_version: version,
                data: data.as_ref(),
                locale: None,
            })
            .await?;

        info!(content_type = %event.content_type, document_id, version, "enqueued for replica push");
        Ok(())
    }

    async fn handle_master(
        &self,
        event: &DocumentEvent,
        document_id: &str,
        data: Option<Value>,
        producer: &dyn BusProducer,
    ) -> Result<()> {
        info!(content_type = %event.content_type, document_id, operation = %event.operation, "master audit: document edited");

        let message = SyncMessage {
            message_id: SyncMessage::make_message_id("master", chrono::Utc::now().timestamp_millis(), document_id),
            ship_id: "master".to_string(),
            timestamp: chrono::Utc::now(),
            operation: event.operation,
            content_type: event.content_type.clone(),
            content_id: document_id.to_string(),
            version: 0,
            data,
            locale: None,
            file_records: event.file_records.clone(),
        };

        if producer.is_connected() {
            producer.send_to_ships(&message).await?;
        } else {
            self.append_to_broadcast_queue(&message).await?;
        }

        Ok(())
    }

    async fn append_to_broadcast_queue(&self, message: &SyncMessage) -> Result<()> {
        let queue: OutboundQueue = self.store.master_queue();
        queue
            .enqueue(offsync_store::EnqueueRequest {
                ship_id: &message.ship_id,
                content_type: &message.content_type,
                content_id: &message.content_id,
                operation: message.operation,
                local_version: message.version as i64,
                data: message.data.as_ref(),
                locale: message.locale.as_deref(),
            })
            .await?;
        Ok(())
    }
}

fn redact_sensitive_fields(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_sensitive_field(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OperationResult;
    use offsync_bus::testing::FakeProducer;
    use serde_json::json;

    fn event(op: SyncOperation, data: Value) -> DocumentEvent {
        DocumentEvent {
            content_type: "api::article.article".into(),
            operation: op,
            result: OperationResult::Single(data),
            params_document_id: None,
            file_records: None,
        }
    }

    #[tokio::test]
    async fn disallowed_content_type_is_a_no_op() {
        let store = Store::open_in_memory().await.unwrap();
        let interceptor = LifecycleInterceptor::new(
            store.clone(),
            vec!["api::page.page".into()],
            Role::Replica {
                peer_id: "ship-a".into(),
                push: PushDebouncer::spawn(std::time::Duration::from_millis(1), || async {}),
            },
        );

        let evt = event(SyncOperation::Create, json!({"id": "e1", "title": "x"}));
        interceptor.on_document_event(evt).await;

        assert_eq!(store.replica_queue().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replica_create_enqueues_and_bumps_version() {
        let store = Store::open_in_memory().await.unwrap();
        let interceptor = LifecycleInterceptor::new(
            store.clone(),
            Vec::new(),
            Role::Replica {
                peer_id: "ship-a".into(),
                push: PushDebouncer::spawn(std::time::Duration::from_millis(1), || async {}),
            },
        );

        let evt = event(SyncOperation::Create, json!({"id": "e1", "title": "x", "password": "hunter2"}));
        interceptor.on_document_event(evt).await;

        assert_eq!(store.replica_queue().pending_count().await.unwrap(), 1);
        let meta = store
            .versions()
            .get("api::article.article", "e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.sync_version, 1);
    }

    #[tokio::test]
    async fn peer_originated_edit_is_not_re_enqueued() {
        let store = Store::open_in_memory().await.unwrap();
        let interceptor = LifecycleInterceptor::new(
            store.clone(),
            Vec::new(),
            Role::Replica {
                peer_id: "ship-a".into(),
                push: PushDebouncer::spawn(std::time::Duration::from_millis(1), || async {}),
            },
        );

        let evt = event(SyncOperation::Update, json!({"id": "e1", "title": "from master"}));
        origin::scoped(Origin::FromMaster, interceptor.on_document_event(evt)).await;

        assert_eq!(store.replica_queue().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn master_publishes_immediately_when_connected() {
        let store = Store::open_in_memory().await.unwrap();
        let producer = Arc::new(FakeProducer::new(true));
        let interceptor = LifecycleInterceptor::new(
            store.clone(),
            Vec::new(),
            Role::Master { producer: producer.clone() },
        );

        let evt = event(SyncOperation::Update, json!({"id": "e1", "title": "hello"}));
        interceptor.on_document_event(evt).await;

        assert_eq!(producer.sent_to_ships.lock().unwrap().len(), 1);
        assert_eq!(store.master_queue().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn master_falls_back_to_broadcast_queue_when_disconnected() {
        let store = Store::open_in_memory().await.unwrap();
        let producer = Arc::new(FakeProducer::new(false));
        let interceptor = LifecycleInterceptor::new(
            store.clone(),
            Vec::new(),
            Role::Master { producer: producer.clone() },
        );

        let evt = event(SyncOperation::Update, json!({"id": "e1", "title": "hello"}));
        interceptor.on_document_event(evt).await;

        assert!(producer.sent_to_ships.lock().unwrap().is_empty());
        assert_eq!(store.master_queue().pending_count().await.unwrap(), 1);
    }
}
