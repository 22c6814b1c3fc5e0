//! HTTP-surface error type, mapped to status codes at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("store error: {0}")]
    Store(#[from] offsync_store::StoreError),

    #[error("resolver error: {0}")]
    Resolver(#[from] offsync_resolver::ResolverError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("this endpoint is master-only")]
    MasterOnly,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::MasterOnly => StatusCode::FORBIDDEN,
            HttpError::Store(_) | HttpError::Resolver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;
