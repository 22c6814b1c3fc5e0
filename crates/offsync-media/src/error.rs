//! Media-mirror error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("object store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
