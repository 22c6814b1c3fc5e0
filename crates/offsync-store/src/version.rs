//! Version tracker: monotonic per-entity version counter and
//! structural conflict detection.

use std::collections::BTreeSet;

use chrono::Utc;
use offsync_types::{ConflictKind, PeerId, SyncStatus, RESERVED_FIELDS};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::Result;

/// A `SyncMetadata` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncMetadata {
    pub content_type: String,
    pub entity_id: String,
    pub sync_version: i64,
    pub modified_by_location: String,
    pub last_synced_at: Option<chrono::DateTime<Utc>>,
    pub sync_status: String,
    pub conflict_flag: bool,
}

impl SyncMetadata {
    pub fn status(&self) -> SyncStatus {
        self.sync_status.parse().unwrap_or(SyncStatus::Pending)
    }
}

/// The outcome of comparing a local and remote version of the same
/// entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDetection {
    pub has_conflict: bool,
    pub fields: Vec<String>,
    pub kind: Option<ConflictKind>,
}

pub struct VersionTracker {
    pool: SqlitePool,
}

impl VersionTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomically bumps `syncVersion` (initializing to 1 if absent),
    /// sets `modifiedByLocation` and `syncStatus = pending`. Returns
    /// the new version.
    pub async fn increment_version(
        &self,
        content_type: &str,
        entity_id: &str,
        peer_id: &PeerId,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT sync_version FROM sync_metadata WHERE content_type = ? AND entity_id = ?",
        )
        .bind(content_type)
        .bind(entity_id)
        .fetch_optional(&mut *tx)
        .await?;

        let new_version = existing.map(|(v,)| v + 1).unwrap_or(1);

        sqlx::query(
            r#"
            INSERT INTO sync_metadata
                (content_type, entity_id, sync_version, modified_by_location, sync_status, conflict_flag)
            VALUES (?, ?, ?, ?, 'pending', 0)
            ON CONFLICT (content_type, entity_id) DO UPDATE SET
                sync_version = excluded.sync_version,
                modified_by_location = excluded.modified_by_location,
                sync_status = 'pending'
            "#,
        )
        .bind(content_type)
        .bind(entity_id)
        .bind(new_version)
        .bind(peer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(new_version)
    }

    /// Reads the `SyncMetadata` row for an entity, if any.
    pub async fn get(
        &self,
        content_type: &str,
        entity_id: &str,
    ) -> Result<Option<SyncMetadata>> {
        let row = sqlx::query_as(
            "SELECT content_type, entity_id, sync_version, modified_by_location, last_synced_at, sync_status, conflict_flag
             FROM sync_metadata WHERE content_type = ? AND entity_id = ?",
        )
        .bind(content_type)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Clears `conflictFlag`, sets `syncStatus = synced`, `lastSyncedAt = now`.
    pub async fn mark_synced(&self, content_type: &str, entity_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_metadata
            SET sync_status = 'synced', conflict_flag = 0, last_synced_at = ?
            WHERE content_type = ? AND entity_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(content_type)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a `SyncMetadata` row as conflicted, pending manual resolution.
    pub async fn mark_conflict(&self, content_type: &str, entity_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_metadata
            SET sync_status = 'conflict', conflict_flag = 1
            WHERE content_type = ? AND entity_id = ?
            "#,
        )
        .bind(content_type)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entities modified since `since`, excluding ones last modified by
    /// `exclude_peer` — the documented `GET /sync/pull` fallback for a
    /// peer reconnecting without having consumed the bus backlog.
    pub async fn list_since(
        &self,
        since: chrono::DateTime<Utc>,
        exclude_peer: &str,
    ) -> Result<Vec<SyncMetadata>> {
        let rows = sqlx::query_as(
            "SELECT content_type, entity_id, sync_version, modified_by_location, last_synced_at, sync_status, conflict_flag
             FROM sync_metadata
             WHERE modified_by_location != ? AND (last_synced_at IS NULL OR last_synced_at >= ?)
             ORDER BY last_synced_at ASC",
        )
        .bind(exclude_peer)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Removes a `SyncMetadata` row (after a successful delete apply).
    pub async fn purge(&self, content_type: &str, entity_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_metadata WHERE content_type = ? AND entity_id = ?")
            .bind(content_type)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Compares `syncVersion` first: equal means no conflict. Otherwise a
/// per-field structural diff (excluding [`RESERVED_FIELDS`]) computes
/// the set of fields whose stringified JSON values differ; a non-empty
/// set is a `direct` conflict, and a field present on only one side
/// makes it `structural`.
pub fn detect_conflict(local_version: i64, remote_version: i64, local: &Value, remote: &Value) -> ConflictDetection {
    if local_version == remote_version {
        return ConflictDetection {
            has_conflict: false,
            fields: Vec::new(),
            kind: None,
        };
    }

    let local_obj = local.as_object();
    let remote_obj = remote.as_object();

    let mut keys: BTreeSet<&str> = BTreeSet::new();
    if let Some(m) = local_obj {
        keys.extend(m.keys().map(String::as_str));
    }
    if let Some(m) = remote_obj {
        keys.extend(m.keys().map(String::as_str));
    }

    let mut differing = Vec::new();
    let mut structural = false;

    for key in keys {
        if RESERVED_FIELDS.contains(&key) {
            continue;
        }
        let local_value = local_obj.and_then(|m| m.get(key));
        let remote_value = remote_obj.and_then(|m| m.get(key));

        match (local_value, remote_value) {
            (Some(l), Some(r)) => {
                if l != r {
                    differing.push(key.to_string());
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                differing.push(key.to_string());
                structural = true;
            }
            (None, None) => {}
        }
    }

    if differing.is_empty() {
        ConflictDetection {
            has_conflict: false,
            fields: Vec::new(),
            kind: None,
        }
    } else {
        ConflictDetection {
            has_conflict: true,
            fields: differing,
            kind: Some(if structural {
                ConflictKind::Structural
            } else {
                ConflictKind::Direct
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::migrations::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn increment_version_starts_at_one_and_is_monotonic() {
        let pool = setup().await;
        let tracker = VersionTracker::new(pool);

        let v1 = tracker
            .increment_version("api::article.article", "e1", &"ship-a".to_string())
            .await
            .unwrap();
        assert_eq!(v1, 1);

        let v2 = tracker
            .increment_version("api::article.article", "e1", &"ship-a".to_string())
            .await
            .unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn mark_synced_sets_timestamp_and_clears_conflict() {
        let pool = setup().await;
        let tracker = VersionTracker::new(pool);
        tracker
            .increment_version("api::article.article", "e1", &"ship-a".to_string())
            .await
            .unwrap();
        tracker.mark_conflict("api::article.article", "e1").await.unwrap();
        tracker.mark_synced("api::article.article", "e1").await.unwrap();

        let meta = tracker
            .get("api::article.article", "e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.status(), SyncStatus::Synced);
        assert!(!meta.conflict_flag);
        assert!(meta.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn list_since_excludes_the_given_peer() {
        let pool = setup().await;
        let tracker = VersionTracker::new(pool);
        tracker
            .increment_version("api::article.article", "e1", &"ship-a".to_string())
            .await
            .unwrap();
        tracker
            .increment_version("api::article.article", "e2", &"master".to_string())
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        let rows = tracker.list_since(since, "ship-a").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "e2");
    }

    #[test]
    fn equal_versions_never_conflict() {
        let local = json!({"title": "a"});
        let remote = json!({"title": "b"});
        let result = detect_conflict(3, 3, &local, &remote);
        assert!(!result.has_conflict);
    }

    #[test]
    fn differing_field_is_a_direct_conflict() {
        let local = json!({"title": "A", "id": 1});
        let remote = json!({"title": "B", "id": 1});
        let result = detect_conflict(3, 3, &local, &remote);
        // same version => no conflict regardless of field diff
        assert!(!result.has_conflict);

        let result = detect_conflict(2, 3, &local, &remote);
        assert!(result.has_conflict);
        assert_eq!(result.fields, vec!["title".to_string()]);
        assert_eq!(result.kind, Some(ConflictKind::Direct));
    }

    #[test]
    fn field_present_on_one_side_only_is_structural() {
        let local = json!({"title": "A"});
        let remote = json!({"title": "A", "subtitle": "B"});
        let result = detect_conflict(2, 3, &local, &remote);
        assert!(result.has_conflict);
        assert_eq!(result.kind, Some(ConflictKind::Structural));
    }

    #[test]
    fn reserved_fields_are_excluded_from_diffing() {
        let local = json!({"title": "A", "updatedAt": "2024-01-01"});
        let remote = json!({"title": "A", "updatedAt": "2024-01-02"});
        let result = detect_conflict(2, 3, &local, &remote);
        assert!(!result.has_conflict);
    }
}
