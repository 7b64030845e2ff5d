//! Ingestion pipeline: parse → chunk → embed → persist.
//!
//! Every run terminates with the document in `Processed` or `Failed`; the
//! only way a document stays `Processing` is a crash mid-run, which a later
//! reprocess resolves. Failures in the middle steps are caught once, logged,
//! and written onto the document row instead of escaping to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{Document, DocumentChunk, DocumentStore, NewDocument};
use crate::chunker;
use crate::config::AppConfig;
use crate::errors::RagError;
use crate::extract::ExtractorRegistry;
use crate::llm::ModelProvider;
use crate::vector::{PayloadFilter, VectorMetadata, VectorPayload, VectorPoint, VectorStore};

/// Per-document lock registry. Entries live only while some task holds or
/// waits on them; `release` removes ids nobody is using anymore.
struct LockRegistry {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry for `id` unless a guard (or a waiter) still holds a
    /// clone of it.
    async fn release(&self, id: &str) {
        let mut locks = self.inner.lock().await;
        if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    config: AppConfig,
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorStore>,
    provider: Arc<dyn ModelProvider>,
    extractors: Arc<ExtractorRegistry>,
    // Serializes start/reprocess/delete per document id; different documents
    // proceed independently. Shared across clones.
    locks: Arc<LockRegistry>,
}

impl IngestionPipeline {
    pub fn new(
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorStore>,
        provider: Arc<dyn ModelProvider>,
        extractors: Arc<ExtractorRegistry>,
    ) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            config,
            documents,
            vectors,
            provider,
            extractors,
            locks: Arc::new(LockRegistry::new()),
        })
    }

    /// Persist a new upload and kick off ingestion in the background. The
    /// returned document is still `Processing`; callers poll for the final
    /// status.
    pub async fn upload(&self, new: NewDocument) -> Result<Document, RagError> {
        let document = self.documents.create_document(new).await?;
        self.spawn(document.id.clone());
        Ok(document)
    }

    /// Run ingestion for `document_id` as a supervised background task.
    /// A failing run still gets its `Failed` status written; anything that
    /// prevents even that (store outage, missing row) is logged, never
    /// dropped silently.
    pub fn spawn(&self, document_id: String) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.start(&document_id).await {
                tracing::error!(
                    document_id = %document_id,
                    error = %e,
                    "ingestion task could not record a final status"
                );
            }
        })
    }

    /// Ingest one document to a terminal status. Leftover chunks and vectors
    /// from an earlier attempt are purged before the run, so calling this on
    /// a document in any status never duplicates rows. Returns `Ok` both for
    /// `Processed` and for a recorded `Failed`; an `Err` means the failure
    /// could not even be written to the document row.
    pub async fn start(&self, document_id: &str) -> Result<(), RagError> {
        let guard = self.locks.acquire(document_id).await;
        let result = self.start_locked(document_id).await;
        drop(guard);
        self.locks.release(document_id).await;
        result
    }

    /// Re-ingest a document in any status. Same contract as [`start`].
    ///
    /// [`start`]: IngestionPipeline::start
    pub async fn reprocess(&self, document_id: &str) -> Result<(), RagError> {
        self.start(document_id).await
    }

    /// Remove the document with everything derived from it. Vectors go
    /// first: an orphaned vector is at most a storage leak, an orphaned
    /// chunk row pointing at a deleted vector would be a dangling reference.
    pub async fn delete_document(&self, document_id: &str, owner_id: &str) -> Result<(), RagError> {
        let guard = self.locks.acquire(document_id).await;
        let result = self.delete_locked(document_id, owner_id).await;
        drop(guard);
        self.locks.release(document_id).await;
        result
    }

    async fn delete_locked(&self, document_id: &str, owner_id: &str) -> Result<(), RagError> {
        self.documents
            .get_document_owned(document_id, owner_id)
            .await?;

        self.purge_derived(document_id).await?;
        self.documents.delete_document(document_id).await?;

        tracing::info!(document_id = %document_id, "document deleted");
        Ok(())
    }

    async fn purge_derived(&self, document_id: &str) -> Result<(), RagError> {
        let filter = PayloadFilter::Document(document_id.to_string());
        let vectors = self.vectors.delete_by_filter(&filter).await?;
        let chunks = self.documents.delete_chunks(document_id).await?;
        if vectors > 0 || chunks > 0 {
            tracing::debug!(
                document_id = %document_id,
                vectors,
                chunks,
                "purged derived data"
            );
        }
        Ok(())
    }

    async fn start_locked(&self, document_id: &str) -> Result<(), RagError> {
        // A run never appends to leftovers from an earlier attempt.
        self.purge_derived(document_id).await?;
        self.documents.mark_processing(document_id).await?;

        match self.run(document_id).await {
            Ok(chunk_count) => {
                self.documents.mark_processed(document_id).await?;
                tracing::info!(
                    document_id = %document_id,
                    chunks = chunk_count,
                    "document processed"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %e,
                    "ingestion failed"
                );
                self.documents
                    .mark_failed(document_id, &e.to_string())
                    .await?;
                Ok(())
            }
        }
    }

    /// Steps 2–5: extract, chunk, embed, persist rows then vectors.
    async fn run(&self, document_id: &str) -> Result<usize, RagError> {
        let document = self
            .documents
            .get_document(document_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {}", document_id)))?;

        let bytes = self.documents.get_document_bytes(document_id).await?;
        let text = self
            .extractors
            .extract(&bytes, &document.mime_type, &document.filename)?;

        let chunks = chunker::chunk(&text, self.config.chunk_size, self.config.chunk_overlap)?;
        if chunks.is_empty() {
            return Err(RagError::Processing(format!(
                "no text could be extracted from {}",
                document.filename
            )));
        }

        let embeddings = self.provider.embed_batch(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Processing(format!(
                "embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let mut rows = Vec::with_capacity(chunks.len());
        let mut points = Vec::with_capacity(chunks.len());

        for (index, (content, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
            let vector_id = format!("{}-chunk-{}", document_id, index);
            let chunk_id = Uuid::new_v4().to_string();

            rows.push(DocumentChunk {
                id: chunk_id.clone(),
                document_id: document_id.to_string(),
                chunk_index: index as i64,
                content: content.clone(),
                vector_id: vector_id.clone(),
            });
            points.push(VectorPoint {
                id: vector_id,
                embedding,
                payload: VectorPayload {
                    chunk_id,
                    document_id: document_id.to_string(),
                    owner_id: document.owner_id.clone(),
                    content,
                    metadata: VectorMetadata {
                        filename: document.filename.clone(),
                        chunk_index: index,
                    },
                },
            });
        }

        // Rows first, vectors second: at-least-once on the vector side is
        // acceptable, a chunk row without a prior write is not.
        let count = rows.len();
        self.documents.insert_chunks(&rows).await?;
        self.vectors.upsert(points).await?;

        Ok(count)
    }
}
