//! Peer liveness persistence (`PeerSession`).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Partial,
    Failed,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncOutcome::Success => "success",
            SyncOutcome::Partial => "partial",
            SyncOutcome::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PeerSession {
    pub peer_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub is_online: bool,
    pub online_threshold_secs: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub total_syncs: i64,
}

impl PeerSession {
    /// `now − lastSeenAt < onlineThreshold`.
    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.last_seen_at).num_seconds() < self.online_threshold_secs
    }
}

pub struct PeerRegistry {
    pool: SqlitePool,
    default_online_threshold_secs: i64,
}

impl PeerRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            default_online_threshold_secs: 300,
        }
    }

    /// Upserts a `PeerSession`, setting `lastSeenAt = now`, `isOnline = true`.
    pub async fn record_activity(&self, peer_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO peer_sessions (peer_id, last_seen_at, is_online, online_threshold_secs)
            VALUES (?, ?, 1, ?)
            ON CONFLICT (peer_id) DO UPDATE SET last_seen_at = excluded.last_seen_at, is_online = 1
            "#,
        )
        .bind(peer_id)
        .bind(Utc::now())
        .bind(self.default_online_threshold_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advances `lastSyncAt`, `lastSyncStatus`, and `totalSyncs`.
    pub async fn update_sync_status(
        &self,
        peer_id: &str,
        outcome: SyncOutcome,
        count: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO peer_sessions (peer_id, last_seen_at, is_online, last_sync_at, last_sync_status, total_syncs)
            VALUES (?, ?, 1, ?, ?, ?)
            ON CONFLICT (peer_id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                last_sync_status = excluded.last_sync_status,
                total_syncs = peer_sessions.total_syncs + excluded.total_syncs
            "#,
        )
        .bind(peer_id)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(outcome.to_string())
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Computes `isOnline` from `lastSeenAt` vs `onlineThreshold` and
    /// persists the transition if it changed.
    pub async fn get_status(&self, peer_id: &str) -> Result<Option<PeerSession>> {
        let session: Option<PeerSession> = sqlx::query_as(
            "SELECT peer_id, last_seen_at, is_online, online_threshold_secs, last_sync_at, last_sync_status, total_syncs \
             FROM peer_sessions WHERE peer_id = ?",
        )
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(session) = session else {
            return Ok(None);
        };

        let now = Utc::now();
        let computed_online = session.is_online_at(now);
        if computed_online != session.is_online {
            sqlx::query("UPDATE peer_sessions SET is_online = ? WHERE peer_id = ?")
                .bind(computed_online)
                .bind(peer_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(Some(PeerSession {
            is_online: computed_online,
            ..session
        }))
    }

    pub async fn list_all(&self) -> Result<Vec<PeerSession>> {
        let rows = sqlx::query_as(
            "SELECT peer_id, last_seen_at, is_online, online_threshold_secs, last_sync_at, last_sync_status, total_syncs \
             FROM peer_sessions ORDER BY peer_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Flips stale sessions to `isOnline = false` (5-minute janitor).
    pub async fn mark_offline_peers(&self) -> Result<u64> {
        let sessions = self.list_all().await?;
        let now = Utc::now();
        let mut flipped = 0u64;
        for session in sessions {
            if session.is_online && !session.is_online_at(now) {
                sqlx::query("UPDATE peer_sessions SET is_online = 0 WHERE peer_id = ?")
                    .bind(&session.peer_id)
                    .execute(&self.pool)
                    .await?;
                flipped += 1;
            }
        }
        Ok(flipped)
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
    async fn record_activity_marks_peer_online() {
        let pool = setup().await;
        let registry = PeerRegistry::new(pool);
        registry.record_activity("ship-a").await.unwrap();

        let status = registry.get_status("ship-a").await.unwrap().unwrap();
        assert!(status.is_online);
    }

    #[tokio::test]
    async fn stale_peer_is_flipped_offline_by_the_janitor() {
        let pool = setup().await;
        let registry = PeerRegistry::new(pool);
        registry.record_activity("ship-a").await.unwrap();

        sqlx::query(
            "UPDATE peer_sessions SET last_seen_at = ?, online_threshold_secs = 1 WHERE peer_id = 'ship-a'",
        )
        .bind(Utc::now() - chrono::Duration::seconds(10))
        .execute(&registry.pool)
        .await
        .unwrap();

        let flipped = registry.mark_offline_peers().await.unwrap();
        assert_eq!(flipped, 1);

        let status = registry.get_status("ship-a").await.unwrap().unwrap();
        assert!(!status.is_online);
    }

    #[tokio::test]
    async fn update_sync_status_accumulates_total_syncs() {
        let pool = setup().await;
        let registry = PeerRegistry::new(pool);
        registry.record_activity("ship-a").await.unwrap();
        registry
            .update_sync_status("ship-a", SyncOutcome::Success, 5)
            .await
            .unwrap();
        registry
            .update_sync_status("ship-a", SyncOutcome::Success, 3)
            .await
            .unwrap();

        let status = registry.get_status("ship-a").await.unwrap().unwrap();
        assert_eq!(status.total_syncs, 8);
        assert_eq!(status.last_sync_status.as_deref(), Some("success"));
    }
}
