//! VectorStore trait, the abstract interface over vector store backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Chunk provenance carried alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub filename: String,
    pub chunk_index: usize,
}

/// Payload stored with every vector entry. Search results always include the
/// payload, so consumers never need to dereference relational rows to use a
/// hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub chunk_id: String,
    pub document_id: String,
    pub owner_id: String,
    pub content: String,
    pub metadata: VectorMetadata,
}

/// A vector plus payload, keyed by the chunk's stable vector id.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: VectorPayload,
}

/// A ranked search hit. Score is cosine similarity: higher is more relevant,
/// with no further range guarantee.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

/// Equality filter on a payload field, used for owner scoping and
/// per-document deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFilter {
    Owner(String),
    Document(String),
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub dimension: usize,
    pub points: usize,
}

/// Abstract trait for vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with the given dimension if it does not exist.
    /// An existing collection with the same dimension is not an error; a
    /// dimension mismatch is.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), RagError>;

    /// Insert or replace points by id in one batch.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), RagError>;

    /// Ranked cosine-similarity search, optionally constrained by a payload
    /// filter.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<VectorMatch>, RagError>;

    /// Delete all points matching the filter; returns how many were removed.
    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<usize, RagError>;

    /// Delete points by id; returns how many were removed.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, RagError>;

    async fn count(&self, filter: Option<&PayloadFilter>) -> Result<usize, RagError>;

    async fn info(&self) -> Result<CollectionInfo, RagError>;
}
