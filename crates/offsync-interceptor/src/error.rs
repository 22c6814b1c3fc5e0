//! Interceptor error types. Nothing in this crate's public entry point
//! propagates these — they exist so the internal logic can use `?`,
//! and are caught and logged at debug level at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterceptorError {
    #[error("store error: {0}")]
    Store(#[from] offsync_store::StoreError),

    #[error("bus error: {0}")]
    Bus(#[from] offsync_bus::BusError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InterceptorError>;
