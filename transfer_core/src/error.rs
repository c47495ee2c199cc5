//! Application error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid path outside of the storage directory")]
    InvalidPath,

    #[error("File type not allowed: {0}")]
    DisallowedType(String),

    #[error("Not enough free space: {required} bytes required, {free} bytes free")]
    InsufficientSpace { required: u64, free: u64 },

    #[error("{0}")]
    NotFound(String),

    #[error("Only HTTP/HTTPS URLs are allowed")]
    UnsupportedScheme,

    #[error("Download exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::DisallowedType(_)
            | AppError::InsufficientSpace { .. }
            | AppError::UnsupportedScheme
            | AppError::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidPath => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamFetchFailed(_)
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            AppError::UpstreamFetchFailed(msg) => {
                tracing::error!("Remote download failed: {}", msg);
                "Download failed".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Io(err) => {
                tracing::error!("IO error: {:?}", err);
                "Internal server error".to_string()
            }
            AppError::Other(err) => {
                tracing::error!("Unexpected error: {:?}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
