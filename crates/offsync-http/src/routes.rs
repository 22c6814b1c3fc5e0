//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use offsync_resolver::ContentRepository;
use offsync_store::Resolution;
use offsync_types::{PeerId, SyncMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::{HttpError, Result};
use crate::state::AppState;

pub fn build_router<C: ContentRepository + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/sync/status", get(status::<C>))
        .route("/sync/push", post(push::<C>))
        .route("/sync/pull", get(pull::<C>))
        .route("/sync/conflicts", get(list_conflicts::<C>))
        .route("/sync/conflicts/:id/resolve", post(resolve_conflict::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    mode: String,
    queue_size: i64,
    pending_conflicts: i64,
    is_online: Option<bool>,
    peer_count: Option<usize>,
}

async fn status<C: ContentRepository>(State(state): State<AppState<C>>) -> Result<Json<StatusResponse>> {
    let queue_size = match state.mode {
        offsync_types::Mode::Replica => state.store.replica_queue().pending_count().await?,
        offsync_types::Mode::Master => state.store.master_queue().pending_count().await?,
    };
    let pending_conflicts = state.store.conflicts().pending_count().await?;

    let is_online = match &state.connectivity {
        Some(monitor) => Some(monitor.state().is_online),
        None => None,
    };
    let peer_count = match &state.peers {
        Some(peers) => Some(peers.list_all().await?.len()),
        None => None,
    };

    Ok(Json(StatusResponse {
        mode: state.mode.to_string(),
        queue_size,
        pending_conflicts,
        is_online,
        peer_count,
    }))
}

#[derive(Debug, Deserialize)]
struct PushRequest {
    #[serde(rename = "peerId")]
    peer_id: String,
    messages: Vec<SyncMessage>,
}

#[derive(Debug, Serialize)]
struct PushResponse {
    processed: usize,
    conflicts: usize,
    #[serde(rename = "updatedEntities")]
    updated_entities: Vec<String>,
}

async fn push<C: ContentRepository>(
    State(state): State<AppState<C>>,
    Json(body): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    require_master(&state)?;

    let source: PeerId = body.peer_id;
    let mut processed = 0usize;
    let mut conflicts = 0usize;
    let mut updated_entities = Vec::new();

    for message in &body.messages {
        match state.resolver.apply(message, &source).await? {
            offsync_resolver::ApplyOutcome::Applied { entity_id, .. } => {
                processed += 1;
                updated_entities.push(entity_id);
            }
            offsync_resolver::ApplyOutcome::Conflict { .. } => {
                conflicts += 1;
            }
            offsync_resolver::ApplyOutcome::Dropped { .. } => {}
        }
    }

    Ok(Json(PushResponse {
        processed,
        conflicts,
        updated_entities,
    }))
}

#[derive(Debug, Deserialize)]
struct PullParams {
    #[serde(rename = "peerId")]
    peer_id: String,
    since: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct PullChange {
    #[serde(rename = "contentType")]
    content_type: String,
    #[serde(rename = "entityId")]
    entity_id: String,
    version: i64,
}

async fn pull<C: ContentRepository>(
    State(state): State<AppState<C>>,
    Query(params): Query<PullParams>,
) -> Result<Json<Vec<PullChange>>> {
    require_master(&state)?;

    let rows = state.store.versions().list_since(params.since, &params.peer_id).await?;
    let changes = rows
        .into_iter()
        .map(|row| PullChange {
            content_type: row.content_type,
            entity_id: row.entity_id,
            version: row.sync_version,
        })
        .collect();

    Ok(Json(changes))
}

#[derive(Debug, Serialize)]
struct ConflictSummary {
    id: i64,
    #[serde(rename = "contentType")]
    content_type: String,
    #[serde(rename = "entityId")]
    entity_id: String,
    fields: Vec<String>,
    #[serde(rename = "conflictType")]
    conflict_type: String,
}

async fn list_conflicts<C: ContentRepository>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<ConflictSummary>>> {
    let rows = state.store.conflicts().list_pending().await?;
    let summaries = rows
        .into_iter()
        .map(|row| ConflictSummary {
            id: row.id,
            content_type: row.content_type,
            entity_id: row.entity_id,
            fields: row.fields(),
            conflict_type: row.conflict_type,
        })
        .collect();
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    choice: String,
    merged: Option<Value>,
    #[serde(rename = "resolvedBy")]
    resolved_by: String,
    #[serde(rename = "asPeer", default = "default_resolver_peer")]
    as_peer: String,
}

fn default_resolver_peer() -> String {
    "master".to_string()
}

async fn resolve_conflict<C: ContentRepository>(
    State(state): State<AppState<C>>,
    Path(id): Path<i64>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<Value>> {
    let choice = match body.choice.as_str() {
        "keep_local" => Resolution::KeepLocal,
        "keep_remote" => Resolution::KeepRemote,
        "merge" => Resolution::Merge,
        other => return Err(HttpError::BadRequest(format!("unknown resolution choice: {other}"))),
    };

    let result = state
        .resolver
        .resolve_conflict(id, choice, body.merged, &body.resolved_by, &body.as_peer)
        .await?;

    Ok(Json(result))
}

fn require_master<C: ContentRepository>(state: &AppState<C>) -> Result<()> {
    if state.mode != offsync_types::Mode::Master {
        return Err(HttpError::MasterOnly);
    }
    Ok(())
}
