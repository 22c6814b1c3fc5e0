//! The CMS contract: an out-of-scope collaborator, only its contract
//! is specified here. Real deployments bind this to the hosting CMS's
//! document API; the sync engine only ever sees this trait.

use async_trait::async_trait;
use serde_json::Value;

/// Document CRUD as the sync engine needs it. `content_type` is an
/// opaque identifier; `entity_id` is opaque beyond being a stable key.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Whether `content_type` is a type the CMS recognizes at all
    /// (distinct from the allow-list in `offsync-config`, which scopes
    /// which *recognized* types get synced).
    fn recognizes(&self, content_type: &str) -> bool;

    async fn get(&self, content_type: &str, entity_id: &str) -> Result<Option<Value>, String>;

    async fn create(
        &self,
        content_type: &str,
        entity_id: &str,
        data: &Value,
    ) -> Result<Value, String>;

    async fn update(
        &self,
        content_type: &str,
        entity_id: &str,
        data: &Value,
    ) -> Result<Value, String>;

    async fn delete(&self, content_type: &str, entity_id: &str) -> Result<(), String>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory CMS double: keyed by `(content_type, entity_id)`.
    #[derive(Default)]
    pub struct FakeContentRepository {
        pub entities: Mutex<HashMap<(String, String), Value>>,
        pub recognized_types: Mutex<Vec<String>>,
    }

    impl FakeContentRepository {
        pub fn new(recognized_types: Vec<String>) -> Self {
            Self {
                entities: Mutex::new(HashMap::new()),
                recognized_types: Mutex::new(recognized_types),
            }
        }

        pub fn seed(&self, content_type: &str, entity_id: &str, data: Value) {
            self.entities
                .lock()
                .unwrap()
                .insert((content_type.to_string(), entity_id.to_string()), data);
        }
    }

    #[async_trait]
    impl ContentRepository for FakeContentRepository {
        fn recognizes(&self, content_type: &str) -> bool {
            self.recognized_types.lock().unwrap().iter().any(|t| t == content_type)
        }

        async fn get(&self, content_type: &str, entity_id: &str) -> Result<Option<Value>, String> {
            Ok(self
                .entities
                .lock()
                .unwrap()
                .get(&(content_type.to_string(), entity_id.to_string()))
                .cloned())
        }

        async fn create(
            &self,
            content_type: &str,
            entity_id: &str,
            data: &Value,
        ) -> Result<Value, String> {
            self.entities
                .lock()
                .unwrap()
                .insert((content_type.to_string(), entity_id.to_string()), data.clone());
            Ok(data.clone())
        }

        async fn update(
            &self,
            content_type: &str,
            entity_id: &str,
            data: &Value,
        ) -> Result<Value, String> {
            self.entities
                .lock()
                .unwrap()
                .insert((content_type.to_string(), entity_id.to_string()), data.clone());
            Ok(data.clone())
        }

        async fn delete(&self, content_type: &str, entity_id: &str) -> Result<(), String> {
            self.entities
                .lock()
                .unwrap()
                .remove(&(content_type.to_string(), entity_id.to_string()));
            Ok(())
        }
    }
}
