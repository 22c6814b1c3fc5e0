//! Connectivity error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("bus error: {0}")]
    Bus(#[from] offsync_bus::BusError),

    #[error("store error: {0}")]
    Store(#[from] offsync_store::StoreError),

    #[error("health probe failed: {0}")]
    HealthProbe(#[from] reqwest::Error),

    #[error("timed out waiting for connectivity after {0:?}")]
    WaitTimeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, ConnectivityError>;
