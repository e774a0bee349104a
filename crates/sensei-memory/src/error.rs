//! Error types for the memory subsystem

use thiserror::Error;

/// Memory subsystem error taxonomy.
///
/// `NotFound` is an idempotent no-op for delete operations and is never
/// surfaced as a failure by the sweeper. `Transient` failures may be retried
/// once; `PermissionDenied` aborts the current operation.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MemoryError {
    /// Whether a single bounded retry is worth attempting.
    pub fn is_retryable(&self) -> bool {
        match self {
            MemoryError::Transient(_) => true,
            MemoryError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether this is the idempotent "already gone" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MemoryError::NotFound(_))
    }
}

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
