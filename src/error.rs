use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Ticker not found")]
    TickerNotFound,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("State store error: {0}")]
    StateError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Document parse error: {0}")]
    ParseError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] FromUtf8Error),

    #[error(
        "Unexpected content type from URL {url}. Expected pattern {expected_pattern}, but got Content-Type: {got_content_type}. Content preview: {content_preview}..."
    )]
    UnexpectedContentType {
        url: String,
        expected_pattern: String, // e.g., "application/json"
        got_content_type: String,
        content_preview: String,
    },
}

impl From<tempfile::PersistError> for IngestError {
    fn from(error: tempfile::PersistError) -> Self {
        IngestError::FileError(error.error)
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
