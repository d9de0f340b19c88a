// src/error.rs
// Standardized error types for the memory layer

use thiserror::Error;

/// Main error type for the agent-memory library
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("qdrant error: {0}")]
    Qdrant(#[from] qdrant_client::QdrantError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using MemoryError
pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// True for errors worth retrying (network, timeouts, store hiccups)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MemoryError::Http(_) | MemoryError::Timeout(_) | MemoryError::Qdrant(_)
        )
    }
}

impl From<String> for MemoryError {
    fn from(s: String) -> Self {
        MemoryError::Other(s)
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoryError::Other(format!("background task failed: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for MemoryError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        MemoryError::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_error() {
        let err = MemoryError::InvalidInput("empty text".to_string());
        assert!(err.to_string().contains("invalid input"));
        assert!(err.to_string().contains("empty text"));
    }

    #[test]
    fn test_unsupported_format_error() {
        let err = MemoryError::UnsupportedFormat("image/png".to_string());
        assert!(err.to_string().contains("unsupported format"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = MemoryError::Timeout("qdrant search".to_string());
        assert!(err.is_transient());
    }

    #[test]
    fn test_from_string() {
        let err: MemoryError = "boom".to_string().into();
        assert!(matches!(err, MemoryError::Other(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.txt");
        let err: MemoryError = io_err.into();
        assert!(matches!(err, MemoryError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: MemoryError = json_err.into();
        assert!(matches!(err, MemoryError::Json(_)));
    }
}
