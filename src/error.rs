use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Record changed concurrently: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External error: {0}")]
    External(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Ingestion-related errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("optimistic save still conflicting after {0} retries")]
    ConflictRetriesExhausted(u32),

    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),
}

/// Recording-pipeline errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("payment record {0} no longer exists")]
    RecordMissing(Uuid),

    #[error("recording attempt {attempts} failed: {message}")]
    AttemptFailed { attempts: i32, message: String },
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::Conflict(_) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                "Record changed concurrently".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AppError::External(format!("Request timeout: {}", error))
        } else {
            AppError::External(format!("HTTP request error: {}", error))
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
