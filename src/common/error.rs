//! Error types for triblob

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Protocol Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // === Placement Errors ===
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Metadata Errors ===
    #[error("Repository error: {0}")]
    Repository(String),

    #[cfg(feature = "rocksdb-backend")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status code carried on the wire next to the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Cancelled,
    ResourceExhausted,
    Storage,
    Repository,
    Internal,
}

/// JSON body of every failed HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Cancelled(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Cancelled(_) | Error::Http(_) => ErrorCode::Cancelled,
            Error::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            Error::Storage(_) | Error::Io(_) => ErrorCode::Storage,
            Error::Repository(_) => ErrorCode::Repository,
            #[cfg(feature = "rocksdb-backend")]
            Error::RocksDb(_) => ErrorCode::Repository,
            Error::InvalidConfig(_) | Error::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The message without the kind prefix, as sent on the wire.
    pub fn message(&self) -> String {
        match self {
            Error::InvalidArgument(m)
            | Error::NotFound(m)
            | Error::Cancelled(m)
            | Error::ResourceExhausted(m)
            | Error::Storage(m)
            | Error::Repository(m)
            | Error::Http(m)
            | Error::InvalidConfig(m)
            | Error::Internal(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuild a typed error from its wire representation.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ErrorCode::InvalidArgument => Error::InvalidArgument(message),
            ErrorCode::NotFound => Error::NotFound(message),
            ErrorCode::Cancelled => Error::Cancelled(message),
            ErrorCode::ResourceExhausted => Error::ResourceExhausted(message),
            ErrorCode::Storage => Error::Storage(message),
            ErrorCode::Repository => Error::Repository(message),
            ErrorCode::Internal => Error::Internal(message),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.message(),
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.code() {
            ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Cancelled => StatusCode::BAD_GATEWAY,
            ErrorCode::ResourceExhausted => StatusCode::INSUFFICIENT_STORAGE,
            ErrorCode::Storage | ErrorCode::Repository | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self.code() {
            ErrorCode::InvalidArgument | ErrorCode::NotFound => {
                tracing::warn!("request failed: {}", self)
            }
            _ => tracing::error!("request failed: {}", self),
        }
        (self.to_http_status(), axum::Json(self.to_body())).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

/// Pass successful responses through; turn failures back into typed errors.
///
/// Bodies that are not an [`ErrorBody`] (proxies, panics) become `Http`.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await?;
    match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(error) => Err(Error::from_code(error.code, error.message)),
        Err(_) => Err(Error::Http(format!(
            "status {}: {}",
            status,
            String::from_utf8_lossy(&body)
        ))),
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Repository(format!("row encoding: {}", e))
    }
}
