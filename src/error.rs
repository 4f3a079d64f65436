// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::storage::StorageError;

/// Fixed body returned when a write violates a unique field
pub const DUPLICATE_KEY_MESSAGE: &str = "duplicate unique id";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 400 Bad Request, unique constraint violated on write
    DuplicateKey,

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error, storage failure forwarded as-is
    Storage(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::DuplicateKey => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Storage(_) => 500,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::DuplicateKey => DUPLICATE_KEY_MESSAGE,
            ApiError::NotFound(msg) => msg,
            ApiError::Storage(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::DuplicateKey => "DUPLICATE_KEY",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ApiError::Storage(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateKey { field } => {
                tracing::warn!("Duplicate key on unique field '{}'", field);
                ApiError::DuplicateKey
            }
            other => {
                tracing::error!("Storage error: {}", other);
                ApiError::storage(other.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {}", err);
        ApiError::internal_server_error("Failed to format response")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self {
            // Plain-text body is part of the wire contract for duplicate keys
            ApiError::DuplicateKey => (status, DUPLICATE_KEY_MESSAGE).into_response(),
            other => (status, Json(other.to_json())).into_response(),
        }
    }
}
