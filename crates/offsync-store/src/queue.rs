//! Outbound queues: the replica's durable FIFO of local
//! edits and the master's durable FIFO of broadcasts pending a bus
//! reconnect. Both share the same coalescing contract — at most one
//! `pending` row per `(contentType, contentId, locale)` — so they are
//! implemented here against the same SQL shape, parameterized by table
//! name.

use chrono::Utc;
use offsync_types::SyncOperation;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::Result;

/// A queued outbound edit (`SyncQueueEntry` / `MasterQueueEntry`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueEntry {
    pub id: i64,
    pub ship_id: String,
    pub content_type: String,
    pub content_id: String,
    pub operation: String,
    pub local_version: i64,
    pub data: Option<String>,
    pub locale: Option<String>,
    pub status: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
}

impl QueueEntry {
    pub fn parsed_data(&self) -> Result<Option<Value>> {
        Ok(match &self.data {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        })
    }

    pub fn parsed_operation(&self) -> SyncOperation {
        self.operation.parse().unwrap_or(SyncOperation::Update)
    }
}

/// A new edit to enqueue.
pub struct EnqueueRequest<'a> {
    pub ship_id: &'a str,
    pub content_type: &'a str,
    pub content_id: &'a str,
    pub operation: SyncOperation,
    pub local_version: i64,
    pub data: Option<&'a Value>,
    pub locale: Option<&'a str>,
}

/// Which durable FIFO this handle addresses.
#[derive(Debug, Clone, Copy)]
enum Table {
    ReplicaOutbound,
    MasterBroadcast,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::ReplicaOutbound => "sync_queue_entries",
            Table::MasterBroadcast => "master_queue_entries",
        }
    }

    fn has_ship_id_column(self) -> bool {
        matches!(self, Table::ReplicaOutbound)
    }
}

/// Shared implementation for the replica outbound queue (4.B) and the
/// master broadcast queue (4.C).
pub struct OutboundQueue {
    pool: SqlitePool,
    table: Table,
    max_retries: i64,
}

impl OutboundQueue {
    pub fn replica_outbound(pool: SqlitePool) -> Self {
        Self {
            pool,
            table: Table::ReplicaOutbound,
            max_retries: 3,
        }
    }

    pub fn master_broadcast(pool: SqlitePool) -> Self {
        Self {
            pool,
            table: Table::MasterBroadcast,
            max_retries: 3,
        }
    }

    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overwrites the pending row for `(contentType, contentId, locale)`
    /// if one exists, collapsing rapid successive edits into a single
    /// outbound message and resetting `retryCount` to 0; otherwise
    /// inserts a new row.
    pub async fn enqueue(&self, req: EnqueueRequest<'_>) -> Result<i64> {
        let table = self.table.name();
        let data = match req.data {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        let existing: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT id FROM {table} WHERE content_type = ? AND content_id = ? \
             AND COALESCE(locale, '') = COALESCE(?, '') AND status = 'pending'"
        ))
        .bind(req.content_type)
        .bind(req.content_id)
        .bind(req.locale)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query(&format!(
                "UPDATE {table} SET operation = ?, local_version = ?, data = ?, retry_count = 0, error_message = NULL WHERE id = ?"
            ))
            .bind(req.operation.to_string())
            .bind(req.local_version)
            .bind(&data)
            .bind(id)
            .execute(&self.pool)
            .await?;
            return Ok(id);
        }

        let ship_id_column = if self.table.has_ship_id_column() {
            "ship_id, "
        } else {
            ""
        };
        let ship_id_placeholder = if self.table.has_ship_id_column() {
            "?, "
        } else {
            ""
        };

        let sql = format!(
            "INSERT INTO {table} ({ship_id_column}content_type, content_id, operation, local_version, data, locale) \
             VALUES ({ship_id_placeholder}?, ?, ?, ?, ?, ?)"
        );
        let mut query = sqlx::query(&sql);
        if self.table.has_ship_id_column() {
            query = query.bind(req.ship_id);
        }
        let result = query
            .bind(req.content_type)
            .bind(req.content_id)
            .bind(req.operation.to_string())
            .bind(req.local_version)
            .bind(&data)
            .bind(req.locale)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Oldest-first pending rows, capped at `limit`.
    pub async fn get_pending(&self, limit: i64) -> Result<Vec<QueueEntry>> {
        let table = self.table.name();
        let ship_id_select = if self.table.has_ship_id_column() {
            "ship_id"
        } else {
            "'master' AS ship_id"
        };
        let rows = sqlx::query_as(&format!(
            "SELECT id, {ship_id_select}, content_type, content_id, operation, local_version, \
             data, locale, status, retry_count, error_message \
             FROM {table} WHERE status = 'pending' ORDER BY created_at ASC, id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Marks a row sent.
    pub async fn mark_synced(&self, id: i64) -> Result<()> {
        let table = self.table.name();
        sqlx::query(&format!(
            "UPDATE {table} SET status = 'sent', sent_at = ? WHERE id = ?"
        ))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Increments `retryCount`; past `maxRetries` the row is marked
    /// `failed`, otherwise it is left `pending` for the next pass.
    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let table = self.table.name();
        let row: (i64,) = sqlx::query_as(&format!("SELECT retry_count FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        let retry_count = row.0 + 1;
        let status = if retry_count >= self.max_retries {
            "failed"
        } else {
            "pending"
        };

        sqlx::query(&format!(
            "UPDATE {table} SET retry_count = ?, status = ?, error_message = ? WHERE id = ?"
        ))
        .bind(retry_count)
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Moves failed rows below the retry cap back to `pending`.
    pub async fn retry_failed(&self) -> Result<u64> {
        let table = self.table.name();
        let result = sqlx::query(&format!(
            "UPDATE {table} SET status = 'pending' WHERE status = 'failed' AND retry_count < ?"
        ))
        .bind(self.max_retries)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Removes `sent` rows older than `retention_days`.
    pub async fn prune(&self, retention_days: i64) -> Result<u64> {
        let table = self.table.name();
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE status = 'sent' AND sent_at < ?"
        ))
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Total number of pending rows (for `GET /sync/status`'s `queueSize`).
    pub async fn pending_count(&self) -> Result<i64> {
        let table = self.table.name();
        let row: (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} WHERE status = 'pending'"))
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
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
    async fn second_enqueue_for_same_key_collapses_into_one_row() {
        let pool = setup().await;
        let queue = OutboundQueue::replica_outbound(pool);

        let create_data = json!({"title": "v1"});
        queue
            .enqueue(EnqueueRequest {
                ship_id: "ship-a",
                content_type: "api::article.article",
                content_id: "e1",
                operation: SyncOperation::Create,
                local_version: 1,
                data: Some(&create_data),
                locale: None,
            })
            .await
            .unwrap();

        let update_data = json!({"title": "v2"});
        queue
            .enqueue(EnqueueRequest {
                ship_id: "ship-a",
                content_type: "api::article.article",
                content_id: "e1",
                operation: SyncOperation::Update,
                local_version: 2,
                data: Some(&update_data),
                locale: None,
            })
            .await
            .unwrap();

        let pending = queue.get_pending(50).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, "update");
        assert_eq!(pending[0].local_version, 2);
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn mark_failed_escalates_to_failed_after_max_retries() {
        let pool = setup().await;
        let queue = OutboundQueue::replica_outbound(pool).with_max_retries(2);

        let id = queue
            .enqueue(EnqueueRequest {
                ship_id: "ship-a",
                content_type: "t",
                content_id: "e1",
                operation: SyncOperation::Update,
                local_version: 1,
                data: None,
                locale: None,
            })
            .await
            .unwrap();

        queue.mark_failed(id, "boom").await.unwrap();
        assert_eq!(queue.get_pending(50).await.unwrap().len(), 1);

        queue.mark_failed(id, "boom again").await.unwrap();
        assert_eq!(queue.get_pending(50).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn master_broadcast_queue_has_no_per_ship_scoping() {
        let pool = setup().await;
        let queue = OutboundQueue::master_broadcast(pool);

        queue
            .enqueue(EnqueueRequest {
                ship_id: "master",
                content_type: "t",
                content_id: "e1",
                operation: SyncOperation::Create,
                local_version: 1,
                data: None,
                locale: None,
            })
            .await
            .unwrap();

        let pending = queue.get_pending(50).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ship_id, "master");
    }
}
