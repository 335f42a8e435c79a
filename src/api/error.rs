use crate::error::AdapterError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<AdapterError> for AppError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::SourceStream(e) => {
                AppError::BadRequest(format!("Upload stream failed: {}", e))
            }
            AdapterError::Config(msg) => AppError::BadRequest(msg),
            AdapterError::NotFound(key) => AppError::NotFound(format!("No object at {}", key)),
            e @ AdapterError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            AdapterError::Transfer(e) | AdapterError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                AppError::BadGateway("Storage backend error".to_string())
            }
            AdapterError::InvalidState(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
