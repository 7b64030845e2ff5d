//! SQLite-backed document store.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::store::{
    Document, DocumentChunk, DocumentStatus, DocumentStore, DocumentSummary, NewDocument,
};
use crate::errors::RagError;

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('PROCESSING', 'PROCESSED', 'FAILED')),
                error TEXT,
                content BLOB NOT NULL,
                uploaded_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                processed_at TEXT,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS document_chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                vector_id TEXT NOT NULL,
                UNIQUE(document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id, uploaded_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id, chunk_index)",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    async fn current_status(&self, id: &str) -> Result<DocumentStatus, RagError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::internal)?;

        let status = status.ok_or_else(|| RagError::NotFound(format!("document {}", id)))?;
        DocumentStatus::parse(&status)
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document, RagError> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        status: DocumentStatus::parse(&status)?,
        error: row.get("error"),
        uploaded_at: row.get("uploaded_at"),
        processed_at: row.get("processed_at"),
        updated_at: row.get("updated_at"),
    })
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> DocumentChunk {
    DocumentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        vector_id: row.get("vector_id"),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create_document(&self, new: NewDocument) -> Result<Document, RagError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "\
            INSERT INTO documents (id, owner_id, filename, mime_type, size_bytes, status, content)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(&new.owner_id)
        .bind(&new.filename)
        .bind(&new.mime_type)
        .bind(new.bytes.len() as i64)
        .bind(DocumentStatus::Processing.as_str())
        .bind(&new.bytes)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        self.get_document(&id)
            .await?
            .ok_or_else(|| RagError::Internal("document vanished after insert".to_string()))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, RagError> {
        let row = sqlx::query(
            "\
            SELECT id, owner_id, filename, mime_type, size_bytes, status, error,
                   uploaded_at, processed_at, updated_at
            FROM documents WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::internal)?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn get_document_owned(&self, id: &str, owner_id: &str) -> Result<Document, RagError> {
        let document = self
            .get_document(id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {}", id)))?;

        if document.owner_id != owner_id {
            return Err(RagError::AccessDenied(format!("document {}", id)));
        }
        Ok(document)
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>, RagError> {
        let rows = sqlx::query(
            "\
            SELECT d.id, d.filename, d.mime_type, d.size_bytes, d.status, d.error, d.uploaded_at,
                   (SELECT COUNT(*) FROM document_chunks WHERE document_id = d.id) as chunk_count
            FROM documents d
            WHERE d.owner_id = ?1
            ORDER BY d.uploaded_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::internal)?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(DocumentSummary {
                    id: row.get("id"),
                    filename: row.get("filename"),
                    mime_type: row.get("mime_type"),
                    size_bytes: row.get("size_bytes"),
                    status: DocumentStatus::parse(&status)?,
                    error: row.get("error"),
                    uploaded_at: row.get("uploaded_at"),
                    chunk_count: row.get("chunk_count"),
                })
            })
            .collect()
    }

    async fn get_document_bytes(&self, id: &str) -> Result<Vec<u8>, RagError> {
        let bytes: Option<Vec<u8>> = sqlx::query_scalar("SELECT content FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::internal)?;

        bytes.ok_or_else(|| RagError::NotFound(format!("document {}", id)))
    }

    async fn mark_processing(&self, id: &str) -> Result<(), RagError> {
        // Entering Processing is legal from any state; still routed through
        // the transition check so the rule lives in one place.
        self.current_status(id)
            .await?
            .transition_to(DocumentStatus::Processing)?;

        sqlx::query(
            "\
            UPDATE documents
            SET status = ?1, error = NULL, processed_at = NULL,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?2",
        )
        .bind(DocumentStatus::Processing.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    async fn mark_processed(&self, id: &str) -> Result<(), RagError> {
        self.current_status(id)
            .await?
            .transition_to(DocumentStatus::Processed)?;

        sqlx::query(
            "\
            UPDATE documents
            SET status = ?1, error = NULL, processed_at = ?2,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?3 AND status = ?4",
        )
        .bind(DocumentStatus::Processed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(DocumentStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), RagError> {
        self.current_status(id)
            .await?
            .transition_to(DocumentStatus::Failed)?;

        sqlx::query(
            "\
            UPDATE documents
            SET status = ?1, error = ?2, processed_at = NULL,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?3 AND status = ?4",
        )
        .bind(DocumentStatus::Failed.as_str())
        .bind(error)
        .bind(id)
        .bind(DocumentStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;

        for chunk in chunks {
            sqlx::query(
                "\
                INSERT INTO document_chunks (id, document_id, chunk_index, content, vector_id)
                VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.vector_id)
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        }

        tx.commit().await.map_err(RagError::internal)?;
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, RagError> {
        let rows = sqlx::query(
            "\
            SELECT id, document_id, chunk_index, content, vector_id
            FROM document_chunks
            WHERE document_id = ?1
            ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn chunk_count(&self, document_id: &str) -> Result<usize, RagError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(RagError::internal)?;

        Ok(count as usize)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<usize, RagError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_document(&self, id: &str) -> Result<bool, RagError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(result.rows_affected() > 0)
    }
}
