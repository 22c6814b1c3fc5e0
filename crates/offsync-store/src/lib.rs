//! SQLite-backed persistence for the offline-sync replication engine.
//!
//! One [`SqlitePool`] backs every repository here: the version tracker,
//! both outbound queues, the conflict log, peer liveness, the dedup
//! ledger, and the dead-letter store. [`Store::open`] runs migrations
//! and hands back a cheaply-clonable handle exposing each repository.

mod conflict;
mod deadletter;
mod dedup;
mod error;
mod migrations;
mod peer;
mod queue;
mod version;

pub use conflict::{ConflictLog, ConflictRow, Resolution};
pub use deadletter::{DeadLetter, DeadLetterResolution, DeadLetterStore};
pub use dedup::Deduplicator;
pub use error::{Result, StoreError};
pub use peer::{PeerRegistry, PeerSession, SyncOutcome};
pub use queue::{EnqueueRequest, OutboundQueue, QueueEntry};
pub use version::{detect_conflict, ConflictDetection, SyncMetadata, VersionTracker};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Owns the connection pool and constructs the per-component
/// repositories on demand. Cloning is cheap: [`SqlitePool`] is an
/// `Arc`-backed handle.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the SQLite database at `path` and
    /// runs migrations, using WAL mode for concurrency between the
    /// request-path interceptor and the background sync workers.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect(":memory:").await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn versions(&self) -> VersionTracker {
        VersionTracker::new(self.pool.clone())
    }

    pub fn replica_queue(&self) -> OutboundQueue {
        OutboundQueue::replica_outbound(self.pool.clone())
    }

    pub fn master_queue(&self) -> OutboundQueue {
        OutboundQueue::master_broadcast(self.pool.clone())
    }

    pub fn conflicts(&self) -> ConflictLog {
        ConflictLog::new(self.pool.clone())
    }

    pub fn peers(&self) -> PeerRegistry {
        PeerRegistry::new(self.pool.clone())
    }

    pub fn dedup(&self) -> Deduplicator {
        Deduplicator::new(self.pool.clone())
    }

    pub fn dead_letters(&self) -> DeadLetterStore {
        DeadLetterStore::new(self.pool.clone())
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
