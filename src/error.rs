//! Error types shared across the crate

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Upstream request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not available")]
    MethodNotAvailable,

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Index count mismatch: expected {expected}, got {actual}")]
    IndexCountMismatch { expected: usize, actual: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            Error::Http(_) | Error::Upstream(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Upstream error")
            }
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error"),
            Error::Queue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Queue error"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO error"),
            Error::Codec(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Decode error"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            Error::MethodNotAvailable => (StatusCode::NOT_IMPLEMENTED, "Method not available"),
            Error::OutOfRange(_) => (StatusCode::BAD_REQUEST, "Out of range"),
            Error::IndexCountMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Index count mismatch")
            }
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
