use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Every fallible operation in the ingestion and query pipelines resolves to
/// one of these categories so callers can decide between retrying, surfacing,
/// or recording the failure on a document row.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid input or configuration (bad chunking parameters, empty text).
    #[error("validation error: {0}")]
    Validation(String),
    /// A referenced document or chat does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The resource exists but belongs to a different owner.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The embedding/completion provider or vector store is unreachable,
    /// returned a non-success status, or is missing a configured model.
    /// Retryable by the caller; adapters never retry internally.
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    /// An ingestion step failed. Recorded on the document row as well.
    #[error("processing failed: {0}")]
    Processing(String),
    /// The completion call failed during a chat turn.
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        RagError::Upstream(err.to_string())
    }
}
