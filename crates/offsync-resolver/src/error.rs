//! Resolver error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("store error: {0}")]
    Store(#[from] offsync_store::StoreError),

    #[error("content repository error: {0}")]
    Content(String),

    #[error("unknown content type: {0}")]
    UnknownContentType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conflict {0} requires an explicit merged payload")]
    MergeRequiresPayload(i64),
}

pub type Result<T> = std::result::Result<T, ResolverError>;
