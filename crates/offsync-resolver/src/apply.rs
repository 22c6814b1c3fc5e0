//! The apply path and manual conflict resolution — the
//! algorithmic core of the replication engine.

use offsync_store::{ConflictLog, Resolution as ResolutionChoice, Store, VersionTracker};
use offsync_types::{ConflictKind, PeerId, SyncMessage, SyncOperation};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::content::ContentRepository;
use crate::error::{ResolverError, Result};
use crate::merge::{auto_merge, MergeStrategy};

/// The outcome of [`Resolver::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied { content_type: String, entity_id: String, version: i64 },
    Conflict { conflict_id: i64, fields: Vec<String>, kind: ConflictKind },
    /// Dropped for a non-existent target or unrecognized content type —
    /// not an error, just nothing to do.
    Dropped { reason: String },
}

pub struct Resolver<C: ContentRepository> {
    store: Store,
    content: C,
    merge_strategy: MergeStrategy,
}

impl<C: ContentRepository> Resolver<C> {
    pub fn new(store: Store, content: C, merge_strategy: MergeStrategy) -> Self {
        Self { store, content, merge_strategy }
    }

    fn versions(&self) -> VersionTracker {
        self.store.versions()
    }

    fn conflicts(&self) -> ConflictLog {
        self.store.conflicts()
    }

    /// Applies an inbound [`SyncMessage`]: validates the content type,
    /// checks for a version conflict, and either writes through to the
    /// CMS or records a pending conflict.
    pub async fn apply(&self, message: &SyncMessage, source: &PeerId) -> Result<ApplyOutcome> {
        if !self.content.recognizes(&message.content_type) {
            warn!(content_type = %message.content_type, "unknown content type, dropping");
            return Ok(ApplyOutcome::Dropped {
                reason: format!("unknown content type: {}", message.content_type),
            });
        }

        let local_entity = self
            .content
            .get(&message.content_type, &message.content_id)
            .await
            .map_err(ResolverError::Content)?;
        let local_meta = self.versions().get(&message.content_type, &message.content_id).await?;

        if let (Some(local_data), Some(meta)) = (local_entity.as_ref(), local_meta.as_ref()) {
            let detection = offsync_store::detect_conflict(
                meta.sync_version,
                message.version as i64,
                local_data,
                message.data.as_ref().unwrap_or(&Value::Null),
            );

            if detection.has_conflict {
                let kind = detection.kind.unwrap_or(ConflictKind::Direct);
                let conflict_id = self
                    .conflicts()
                    .upsert_pending(
                        &message.content_type,
                        &message.content_id,
                        Some(local_data),
                        message.data.as_ref(),
                        &detection.fields,
                        kind,
                    )
                    .await?;
                self.versions()
                    .mark_conflict(&message.content_type, &message.content_id)
                    .await?;
                info!(
                    conflict_id,
                    content_type = %message.content_type,
                    entity_id = %message.content_id,
                    "conflict detected, apply stopped"
                );
                return Ok(ApplyOutcome::Conflict {
                    conflict_id,
                    fields: detection.fields,
                    kind,
                });
            }
        }

        let outcome = self
            .dispatch(message, local_entity.as_ref(), source)
            .await?;

        if let ApplyOutcome::Applied { .. } = &outcome {
            self.versions().mark_synced(&message.content_type, &message.content_id).await?;
        }

        Ok(outcome)
    }

    async fn dispatch(
        &self,
        message: &SyncMessage,
        local_entity: Option<&Value>,
        source: &PeerId,
    ) -> Result<ApplyOutcome> {
        let content_type = &message.content_type;
        let entity_id = &message.content_id;

        match message.operation {
            SyncOperation::Create => {
                if local_entity.is_some() {
                    warn!(content_type, entity_id, "create for an entity that already exists, dropping");
                    return Ok(ApplyOutcome::Dropped {
                        reason: "entity already exists".into(),
                    });
                }
                let payload = message.data.clone().unwrap_or(Value::Null);
                self.content
                    .create(content_type, entity_id, &payload)
                    .await
                    .map_err(ResolverError::Content)?;
                let version = self.versions().increment_version(content_type, entity_id, source).await?;
                Ok(ApplyOutcome::Applied {
                    content_type: content_type.clone(),
                    entity_id: entity_id.clone(),
                    version,
                })
            }
            SyncOperation::Update | SyncOperation::Publish => {
                if local_entity.is_none() {
                    warn!(content_type, entity_id, "update for a non-existent entity, dropping");
                    return Ok(ApplyOutcome::Dropped {
                        reason: "entity does not exist locally".into(),
                    });
                }
                let payload = message.data.clone().unwrap_or(Value::Null);
                self.content
                    .update(content_type, entity_id, &payload)
                    .await
                    .map_err(ResolverError::Content)?;
                let version = self.versions().increment_version(content_type, entity_id, source).await?;
                Ok(ApplyOutcome::Applied {
                    content_type: content_type.clone(),
                    entity_id: entity_id.clone(),
                    version,
                })
            }
            SyncOperation::Delete => {
                if local_entity.is_none() {
                    debug!(content_type, entity_id, "delete for an already-absent entity, dropping");
                    return Ok(ApplyOutcome::Dropped {
                        reason: "entity already absent".into(),
                    });
                }
                self.content
                    .delete(content_type, entity_id)
                    .await
                    .map_err(ResolverError::Content)?;
                self.versions().purge(content_type, entity_id).await?;
                Ok(ApplyOutcome::Applied {
                    content_type: content_type.clone(),
                    entity_id: entity_id.clone(),
                    version: 0,
                })
            }
        }
    }

    /// Manual resolution of a pending conflict. For `merge`
    /// without an explicit payload, falls back to the configured
    /// auto-merge strategy.
    pub async fn resolve_conflict(
        &self,
        conflict_id: i64,
        choice: ResolutionChoice,
        merged: Option<Value>,
        resolved_by: &str,
        source: &PeerId,
    ) -> Result<Value> {
        let row = self.conflicts().get(conflict_id).await?;
        let local = row.local()?;
        let remote = row.remote()?;

        let chosen = match choice {
            ResolutionChoice::KeepLocal => local
                .clone()
                .ok_or_else(|| ResolverError::Content("no local payload recorded for conflict".into()))?,
            ResolutionChoice::KeepRemote => remote
                .clone()
                .ok_or_else(|| ResolverError::Content("no remote payload recorded for conflict".into()))?,
            ResolutionChoice::Merge => match merged {
                Some(explicit) => explicit,
                None => {
                    let (local_v, remote_v) = match (local.as_ref(), remote.as_ref()) {
                        (Some(l), Some(r)) => (l, r),
                        _ => return Err(ResolverError::MergeRequiresPayload(conflict_id)),
                    };
                    auto_merge(local_v, remote_v, self.merge_strategy)
                }
            },
        };

        let exists = self
            .content
            .get(&row.content_type, &row.entity_id)
            .await
            .map_err(ResolverError::Content)?
            .is_some();

        if exists {
            self.content
                .update(&row.content_type, &row.entity_id, &chosen)
                .await
                .map_err(ResolverError::Content)?;
        } else {
            self.content
                .create(&row.content_type, &row.entity_id, &chosen)
                .await
                .map_err(ResolverError::Content)?;
        }

        let version = self
            .versions()
            .increment_version(&row.content_type, &row.entity_id, source)
            .await?;
        self.versions().mark_synced(&row.content_type, &row.entity_id).await?;

        self.conflicts()
            .mark_resolved(conflict_id, choice, Some(&chosen), resolved_by)
            .await?;

        info!(conflict_id, version, "conflict manually resolved");
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::testing::FakeContentRepository;
    use chrono::Utc;
    use serde_json::json;

    fn ship() -> PeerId {
        "ship-a".to_string()
    }

    async fn setup() -> (Store, FakeContentRepository) {
        let store = Store::open_in_memory().await.unwrap();
        let content = FakeContentRepository::new(vec!["api::article.article".to_string()]);
        (store, content)
    }

    fn message(op: SyncOperation, version: u64, data: Option<Value>) -> SyncMessage {
        SyncMessage {
            message_id: "ship-a-1-entity-1".into(),
            ship_id: "ship-a".into(),
            timestamp: Utc::now(),
            operation: op,
            content_type: "api::article.article".into(),
            content_id: "entity-1".into(),
            version,
            data,
            locale: None,
            file_records: None,
        }
    }

    #[tokio::test]
    async fn unknown_content_type_is_dropped() {
        let (store, content) = setup().await;
        let resolver = Resolver::new(store, content, MergeStrategy::FieldFill);
        let msg = SyncMessage {
            content_type: "api::unknown.unknown".into(),
            ..message(SyncOperation::Create, 1, Some(json!({"title": "x"})))
        };
        let outcome = resolver.apply(&msg, &ship()).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn create_applies_and_bumps_version() {
        let (store, content) = setup().await;
        let resolver = Resolver::new(store, content, MergeStrategy::FieldFill);
        let msg = message(SyncOperation::Create, 1, Some(json!({"title": "hello"})));
        let outcome = resolver.apply(&msg, &ship()).await.unwrap();
        match outcome {
            ApplyOutcome::Applied { version, .. } => assert_eq!(version, 1),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_on_absent_entity_is_dropped() {
        let (store, content) = setup().await;
        let resolver = Resolver::new(store, content, MergeStrategy::FieldFill);
        let msg = message(SyncOperation::Update, 1, Some(json!({"title": "hello"})));
        let outcome = resolver.apply(&msg, &ship()).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn conflicting_update_is_recorded_and_not_applied() {
        let (store, content) = setup().await;
        content.seed("api::article.article", "entity-1", json!({"title": "local edit"}));
        store
            .versions()
            .increment_version("api::article.article", "entity-1", &ship())
            .await
            .unwrap();
        let resolver = Resolver::new(store.clone(), content, MergeStrategy::FieldFill);

        let msg = message(SyncOperation::Update, 3, Some(json!({"title": "remote edit"})));
        let outcome = resolver.apply(&msg, &ship()).await.unwrap();
        match outcome {
            ApplyOutcome::Conflict { fields, kind, .. } => {
                assert_eq!(fields, vec!["title".to_string()]);
                assert_eq!(kind, ConflictKind::Direct);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }

        let meta = store
            .versions()
            .get("api::article.article", "entity-1")
            .await
            .unwrap()
            .unwrap();
        assert!(meta.conflict_flag);
    }

    #[tokio::test]
    async fn delete_on_absent_entity_is_dropped() {
        let (store, content) = setup().await;
        let resolver = Resolver::new(store, content, MergeStrategy::FieldFill);
        let msg = message(SyncOperation::Delete, 1, None);
        let outcome = resolver.apply(&msg, &ship()).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn resolve_conflict_keep_local_writes_local_payload_back() {
        let (store, content) = setup().await;
        content.seed("api::article.article", "entity-1", json!({"title": "local edit"}));
        store
            .versions()
            .increment_version("api::article.article", "entity-1", &ship())
            .await
            .unwrap();
        let conflict_id = store
            .conflicts()
            .upsert_pending(
                "api::article.article",
                "entity-1",
                Some(&json!({"title": "local edit"})),
                Some(&json!({"title": "remote edit"})),
                &["title".to_string()],
                ConflictKind::Direct,
            )
            .await
            .unwrap();

        let resolver = Resolver::new(store.clone(), content, MergeStrategy::FieldFill);
        let result = resolver
            .resolve_conflict(conflict_id, ResolutionChoice::KeepLocal, None, "admin", &ship())
            .await
            .unwrap();
        assert_eq!(result["title"], "local edit");

        let row = store.conflicts().get(conflict_id).await.unwrap();
        assert_eq!(row.status, "resolved");
    }

    #[tokio::test]
    async fn resolve_conflict_merge_without_payload_uses_auto_merge() {
        let (store, content) = setup().await;
        content.seed("api::article.article", "entity-1", json!({"title": "local edit"}));
        let conflict_id = store
            .conflicts()
            .upsert_pending(
                "api::article.article",
                "entity-1",
                Some(&json!({"title": "local edit"})),
                Some(&json!({"title": "remote edit", "subtitle": "from remote"})),
                &["title".to_string()],
                ConflictKind::Direct,
            )
            .await
            .unwrap();

        let resolver = Resolver::new(store, content, MergeStrategy::FieldFill);
        let result = resolver
            .resolve_conflict(conflict_id, ResolutionChoice::Merge, None, "admin", &ship())
            .await
            .unwrap();
        assert_eq!(result["title"], "local edit");
        assert_eq!(result["subtitle"], "from remote");
    }
}
