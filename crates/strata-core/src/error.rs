//! Error types for strata.

use thiserror::Error;

/// Result type alias using strata's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for strata operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request (empty content/query where disallowed, unknown
    /// strategy, negative limits). Not retryable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Context item not found
    #[error("Item not found: {0}")]
    ItemNotFound(uuid::Uuid),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Long-term write failed after rollback because a collaborator
    /// rejected capacity. Retryable.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// A vector or graph collaborator returned an error
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Retrieval exceeded its overall deadline before any results were ready
    #[error("Deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl Error {
    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::CapacityExhausted(_) | Error::Collaborator(_) | Error::Request(_)
        )
    }

    /// Whether the error is fatal for the caller; everything else is
    /// degraded success on the read path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::DeadlineExceeded(_))
    }
}
