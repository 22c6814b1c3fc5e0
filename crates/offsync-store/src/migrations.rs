//! Database schema migrations.
//!
//! Migrations are idempotent and safe to run multiple times, the same
//! contract the rest of this workspace relies on.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    run_if_needed(pool, 1, "create_sync_metadata", CREATE_SYNC_METADATA).await?;
    run_if_needed(pool, 2, "create_sync_queue_entries", CREATE_SYNC_QUEUE_ENTRIES).await?;
    run_if_needed(pool, 3, "create_master_queue_entries", CREATE_MASTER_QUEUE_ENTRIES).await?;
    run_if_needed(pool, 4, "create_conflict_log", CREATE_CONFLICT_LOG).await?;
    run_if_needed(pool, 5, "create_peer_sessions", CREATE_PEER_SESSIONS).await?;
    run_if_needed(pool, 6, "create_processed_messages", CREATE_PROCESSED_MESSAGES).await?;
    run_if_needed(pool, 7, "create_dead_letters", CREATE_DEAD_LETTERS).await?;

    Ok(())
}

async fn run_if_needed(pool: &SqlitePool, id: i64, name: &str, sql: &str) -> Result<()> {
    let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;

    if exists.0 == 0 {
        tracing::info!(migration = name, "running migration");
        sqlx::query(sql).execute(pool).await?;
        sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await?;
    }

    Ok(())
}

const CREATE_SYNC_METADATA: &str = r#"
CREATE TABLE sync_metadata (
    content_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 0,
    modified_by_location TEXT NOT NULL,
    last_synced_at TIMESTAMP,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    conflict_flag INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (content_type, entity_id)
)
"#;

const CREATE_SYNC_QUEUE_ENTRIES: &str = r#"
CREATE TABLE sync_queue_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ship_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    local_version INTEGER NOT NULL,
    data TEXT,
    locale TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    sent_at TIMESTAMP
);
CREATE UNIQUE INDEX sync_queue_one_pending_per_key
    ON sync_queue_entries (content_type, content_id, COALESCE(locale, ''))
    WHERE status = 'pending';
"#;

const CREATE_MASTER_QUEUE_ENTRIES: &str = r#"
CREATE TABLE master_queue_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    content_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    local_version INTEGER NOT NULL,
    data TEXT,
    locale TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    sent_at TIMESTAMP
);
CREATE UNIQUE INDEX master_queue_one_pending_per_key
    ON master_queue_entries (content_type, content_id, COALESCE(locale, ''))
    WHERE status = 'pending';
"#;

const CREATE_CONFLICT_LOG: &str = r#"
CREATE TABLE conflict_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    local_data TEXT,
    remote_data TEXT,
    conflicting_fields TEXT NOT NULL DEFAULT '[]',
    conflict_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    resolution TEXT,
    merged_data TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    resolved_at TIMESTAMP,
    resolved_by TEXT
);
CREATE UNIQUE INDEX conflict_log_one_pending_per_entity
    ON conflict_log (content_type, entity_id)
    WHERE status = 'pending';
"#;

const CREATE_PEER_SESSIONS: &str = r#"
CREATE TABLE peer_sessions (
    peer_id TEXT PRIMARY KEY,
    last_seen_at TIMESTAMP NOT NULL,
    is_online INTEGER NOT NULL DEFAULT 0,
    online_threshold_secs INTEGER NOT NULL DEFAULT 300,
    last_sync_at TIMESTAMP,
    last_sync_status TEXT,
    total_syncs INTEGER NOT NULL DEFAULT 0
)
"#;

const CREATE_PROCESSED_MESSAGES: &str = r#"
CREATE TABLE processed_messages (
    message_id TEXT PRIMARY KEY,
    processed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const CREATE_DEAD_LETTERS: &str = r#"
CREATE TABLE dead_letters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    resolved_at TIMESTAMP
)
"#;
