//! Conflict log (`ConflictLog`) and manual resolution.

use chrono::Utc;
use offsync_types::ConflictKind;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConflictRow {
    pub id: i64,
    pub content_type: String,
    pub entity_id: String,
    pub local_data: Option<String>,
    pub remote_data: Option<String>,
    pub conflicting_fields: String,
    pub conflict_type: String,
    pub status: String,
    pub resolution: Option<String>,
    pub merged_data: Option<String>,
    pub resolved_by: Option<String>,
}

impl ConflictRow {
    pub fn fields(&self) -> Vec<String> {
        serde_json::from_str(&self.conflicting_fields).unwrap_or_default()
    }

    pub fn local(&self) -> Result<Option<Value>> {
        Ok(match &self.local_data {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        })
    }

    pub fn remote(&self) -> Result<Option<Value>> {
        Ok(match &self.remote_data {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        })
    }
}

/// The resolution choice for `resolveConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    Merge,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::KeepLocal => "keep_local",
            Resolution::KeepRemote => "keep_remote",
            Resolution::Merge => "merge",
        };
        write!(f, "{s}")
    }
}

pub struct ConflictLog {
    pool: SqlitePool,
}

impl ConflictLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts the single `pending` row for `(contentType, entityId)`.
    pub async fn upsert_pending(
        &self,
        content_type: &str,
        entity_id: &str,
        local: Option<&Value>,
        remote: Option<&Value>,
        fields: &[String],
        kind: ConflictKind,
    ) -> Result<i64> {
        let local_json = local.map(serde_json::to_string).transpose()?;
        let remote_json = remote.map(serde_json::to_string).transpose()?;
        let fields_json = serde_json::to_string(fields)?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM conflict_log WHERE content_type = ? AND entity_id = ? AND status = 'pending'",
        )
        .bind(content_type)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query(
                "UPDATE conflict_log SET local_data = ?, remote_data = ?, conflicting_fields = ?, conflict_type = ? WHERE id = ?",
            )
            .bind(&local_json)
            .bind(&remote_json)
            .bind(&fields_json)
            .bind(kind.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
            return Ok(id);
        }

        let result = sqlx::query(
            "INSERT INTO conflict_log (content_type, entity_id, local_data, remote_data, conflicting_fields, conflict_type) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(content_type)
        .bind(entity_id)
        .bind(&local_json)
        .bind(&remote_json)
        .bind(&fields_json)
        .bind(kind.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> Result<ConflictRow> {
        sqlx::query_as(
            "SELECT id, content_type, entity_id, local_data, remote_data, conflicting_fields, \
             conflict_type, status, resolution, merged_data, resolved_by FROM conflict_log WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("conflict {id}")))
    }

    pub async fn list_pending(&self) -> Result<Vec<ConflictRow>> {
        let rows = sqlx::query_as(
            "SELECT id, content_type, entity_id, local_data, remote_data, conflicting_fields, \
             conflict_type, status, resolution, merged_data, resolved_by FROM conflict_log WHERE status = 'pending' ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conflict_log WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Records a resolution decision and the final merged payload, if any.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolution: Resolution,
        merged_data: Option<&Value>,
        resolved_by: &str,
    ) -> Result<()> {
        let merged_json = merged_data.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "UPDATE conflict_log SET status = 'resolved', resolution = ?, merged_data = ?, resolved_at = ?, resolved_by = ? WHERE id = ?",
        )
        .bind(resolution.to_string())
        .bind(&merged_json)
        .bind(Utc::now())
        .bind(resolved_by)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
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
    async fn second_upsert_for_same_entity_updates_the_single_pending_row() {
        let pool = setup().await;
        let log = ConflictLog::new(pool);

        let local = json!({"title": "A"});
        let remote = json!({"title": "B"});

        let id1 = log
            .upsert_pending(
                "t",
                "e1",
                Some(&local),
                Some(&remote),
                &["title".to_string()],
                ConflictKind::Direct,
            )
            .await
            .unwrap();

        let remote2 = json!({"title": "C"});
        let id2 = log
            .upsert_pending(
                "t",
                "e1",
                Some(&local),
                Some(&remote2),
                &["title".to_string()],
                ConflictKind::Direct,
            )
            .await
            .unwrap();

        assert_eq!(id1, id2);
        assert_eq!(log.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_resolved_removes_it_from_pending() {
        let pool = setup().await;
        let log = ConflictLog::new(pool);
        let local = json!({"title": "A"});
        let remote = json!({"title": "B"});

        let id = log
            .upsert_pending(
                "t",
                "e1",
                Some(&local),
                Some(&remote),
                &["title".to_string()],
                ConflictKind::Direct,
            )
            .await
            .unwrap();

        log.mark_resolved(id, Resolution::KeepLocal, None, "admin")
            .await
            .unwrap();

        assert_eq!(log.list_pending().await.unwrap().len(), 0);
        let row = log.get(id).await.unwrap();
        assert_eq!(row.status, "resolved");
        assert_eq!(row.resolution.as_deref(), Some("keep_local"));
    }
}
