//! Document model and the DocumentStore trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Lifecycle of an uploaded document.
///
/// `Processing` is the entry state, set on upload and re-entered only via
/// reprocess. Transition checks live in [`DocumentStatus::transition_to`];
/// stores must route every status write through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Processed => "PROCESSED",
            DocumentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RagError> {
        match s {
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "PROCESSED" => Ok(DocumentStatus::Processed),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => Err(RagError::Internal(format!(
                "unknown document status: {}",
                other
            ))),
        }
    }

    /// Validate a status transition. `Processing` is always re-enterable
    /// (reprocess purges first); terminal states are only reachable from
    /// `Processing`.
    pub fn transition_to(self, next: DocumentStatus) -> Result<DocumentStatus, RagError> {
        let legal = match next {
            DocumentStatus::Processing => true,
            DocumentStatus::Processed | DocumentStatus::Failed => {
                self == DocumentStatus::Processing
            }
        };

        if legal {
            Ok(next)
        } else {
            Err(RagError::Internal(format!(
                "illegal status transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub error: Option<String>,
    pub uploaded_at: String,
    pub processed_at: Option<String>,
    pub updated_at: String,
}

/// Listing row: document metadata plus its current chunk count.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub error: Option<String>,
    pub uploaded_at: String,
    pub chunk_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A persisted chunk row. Immutable once written; deleted only with its
/// document or on reprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
}

/// Relational persistence for documents and their chunk rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new document (status `Processing`) together with its raw
    /// bytes, returning the stored metadata.
    async fn create_document(&self, new: NewDocument) -> Result<Document, RagError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, RagError>;

    /// Fetch a document enforcing ownership: NotFound if the row is missing,
    /// AccessDenied if it belongs to someone else.
    async fn get_document_owned(&self, id: &str, owner_id: &str) -> Result<Document, RagError>;

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>, RagError>;

    /// Raw uploaded bytes, for extraction.
    async fn get_document_bytes(&self, id: &str) -> Result<Vec<u8>, RagError>;

    /// Set status to `Processing`, clearing any prior error and processed_at.
    async fn mark_processing(&self, id: &str) -> Result<(), RagError>;

    /// Transition `Processing` -> `Processed`, stamping processed_at.
    async fn mark_processed(&self, id: &str) -> Result<(), RagError>;

    /// Transition `Processing` -> `Failed`, recording the error text.
    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), RagError>;

    /// Insert chunk rows in one transaction.
    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), RagError>;

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, RagError>;

    async fn chunk_count(&self, document_id: &str) -> Result<usize, RagError>;

    /// Delete all chunk rows for a document; returns how many were removed.
    async fn delete_chunks(&self, document_id: &str) -> Result<usize, RagError>;

    /// Delete the document row (chunks cascade). Returns false when the row
    /// did not exist.
    async fn delete_document(&self, id: &str) -> Result<bool, RagError>;
}
