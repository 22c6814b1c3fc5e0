//! Dead-letter store: quarantine for unresolvable messages.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: i64,
    pub message_id: String,
    pub payload: String,
    pub reason: String,
    pub resolved_at: Option<chrono::DateTime<Utc>>,
}

/// The outcome of resolving a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterResolution {
    /// The caller re-published the original payload; just mark resolved.
    Requeued,
    /// The payload is not worth retrying; mark resolved without replay.
    Discarded,
}

pub struct DeadLetterStore {
    pool: SqlitePool,
}

impl DeadLetterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, message_id: &str, payload: &str, reason: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO dead_letters (message_id, payload, reason) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(payload)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_unresolved(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query_as(
            "SELECT id, message_id, payload, reason, resolved_at FROM dead_letters \
             WHERE resolved_at IS NULL ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> Result<DeadLetter> {
        sqlx::query_as("SELECT id, message_id, payload, reason, resolved_at FROM dead_letters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("dead letter {id}")))
    }

    /// Marks `id` resolved. The caller is responsible for actually
    /// requeueing the payload through the bus producer before calling
    /// this with [`DeadLetterResolution::Requeued`].
    pub async fn resolve(&self, id: i64, _resolution: DeadLetterResolution) -> Result<()> {
        sqlx::query("UPDATE dead_letters SET resolved_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn prune_resolved(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result =
            sqlx::query("DELETE FROM dead_letters WHERE resolved_at IS NOT NULL AND resolved_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::migrations::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn append_then_resolve_removes_it_from_unresolved() {
        let pool = setup().await;
        let store = DeadLetterStore::new(pool);

        let id = store
            .append("msg-1", "{}", "unknown content type")
            .await
            .unwrap();
        assert_eq!(store.list_unresolved().await.unwrap().len(), 1);

        store.resolve(id, DeadLetterResolution::Discarded).await.unwrap();
        assert_eq!(store.list_unresolved().await.unwrap().len(), 0);

        let letter = store.get(id).await.unwrap();
        assert!(letter.resolved_at.is_some());
    }
}
