//! Message deduplicator: exactly-once apply via a
//! processed-message ledger keyed by `messageId`.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;

pub struct Deduplicator {
    pool: SqlitePool,
}

impl Deduplicator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Consulted before apply.
    pub async fn seen(&self, message_id: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT message_id FROM processed_messages WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Called after a successful apply.
    pub async fn record(&self, message_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO processed_messages (message_id, processed_at) VALUES (?, ?) \
             ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Prunes entries older than `retention_days`.
    pub async fn prune(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query("DELETE FROM processed_messages WHERE processed_at < ?")
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
    async fn unseen_message_becomes_seen_after_record() {
        let pool = setup().await;
        let dedup = Deduplicator::new(pool);

        assert!(!dedup.seen("msg-1").await.unwrap());
        dedup.record("msg-1").await.unwrap();
        assert!(dedup.seen("msg-1").await.unwrap());
    }

    #[tokio::test]
    async fn recording_twice_is_idempotent() {
        let pool = setup().await;
        let dedup = Deduplicator::new(pool);
        dedup.record("msg-1").await.unwrap();
        dedup.record("msg-1").await.unwrap();
        assert!(dedup.seen("msg-1").await.unwrap());
    }
}
