//! SQLite-backed vector store.
//!
//! In-process backend using SQLite for payloads and brute-force cosine
//! similarity for search. The collection dimension is pinned in a metadata
//! row and enforced on every upsert.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{
    CollectionInfo, PayloadFilter, VectorMatch, VectorMetadata, VectorPayload, VectorPoint,
    VectorStore,
};
use crate::errors::RagError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::upstream)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                chunk_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::upstream)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_owner ON vectors(owner_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::upstream)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_document ON vectors(document_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::upstream)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collection_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::upstream)?;

        Ok(())
    }

    async fn configured_dimension(&self) -> Result<Option<usize>, RagError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM collection_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(RagError::upstream)?;

        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn filter_clause(filter: Option<&PayloadFilter>) -> (&'static str, Option<&str>) {
        match filter {
            Some(PayloadFilter::Owner(owner)) => (" WHERE owner_id = ?1", Some(owner.as_str())),
            Some(PayloadFilter::Document(doc)) => (" WHERE document_id = ?1", Some(doc.as_str())),
            None => ("", None),
        }
    }

    fn row_to_payload(row: &sqlx::sqlite::SqliteRow) -> VectorPayload {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<VectorMetadata>(&metadata_str).unwrap_or(
            VectorMetadata {
                filename: String::new(),
                chunk_index: 0,
            },
        );

        VectorPayload {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            owner_id: row.get("owner_id"),
            content: row.get("content"),
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), RagError> {
        match self.configured_dimension().await? {
            Some(existing) if existing == dimension => Ok(()),
            Some(existing) => Err(RagError::Validation(format!(
                "collection dimension mismatch: configured {}, requested {}",
                existing, dimension
            ))),
            None => {
                sqlx::query(
                    "INSERT OR REPLACE INTO collection_meta (key, value, updated_at)
                     VALUES ('dimension', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                )
                .bind(dimension.to_string())
                .execute(&self.pool)
                .await
                .map_err(RagError::upstream)?;
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), RagError> {
        if points.is_empty() {
            return Ok(());
        }

        let dimension = self.configured_dimension().await?;
        if let Some(dim) = dimension {
            if let Some(bad) = points.iter().find(|p| p.embedding.len() != dim) {
                return Err(RagError::Validation(format!(
                    "embedding for {} has dimension {}, collection expects {}",
                    bad.id,
                    bad.embedding.len(),
                    dim
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(RagError::upstream)?;

        for point in &points {
            let blob = Self::serialize_embedding(&point.embedding);
            let metadata =
                serde_json::to_string(&point.payload.metadata).map_err(RagError::internal)?;

            sqlx::query(
                "INSERT OR REPLACE INTO vectors
                     (id, chunk_id, document_id, owner_id, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&point.id)
            .bind(&point.payload.chunk_id)
            .bind(&point.payload.document_id)
            .bind(&point.payload.owner_id)
            .bind(&point.payload.content)
            .bind(&metadata)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::upstream)?;
        }

        tx.commit().await.map_err(RagError::upstream)?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<VectorMatch>, RagError> {
        let (clause, bind) = Self::filter_clause(filter);
        let sql = format!(
            "SELECT id, chunk_id, document_id, owner_id, content, metadata, embedding
             FROM vectors{}",
            clause
        );

        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::upstream)?;

        let mut scored: Vec<VectorMatch> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                VectorMatch {
                    id: row.get("id"),
                    score: Self::cosine_similarity(vector, &stored),
                    payload: Self::row_to_payload(row),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<usize, RagError> {
        let (clause, bind) = Self::filter_clause(Some(filter));
        let sql = format!("DELETE FROM vectors{}", clause);

        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(RagError::upstream)?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, RagError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(RagError::upstream)?;
        let mut removed = 0usize;

        for id in ids {
            let result = sqlx::query("DELETE FROM vectors WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::upstream)?;
            removed += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(RagError::upstream)?;
        Ok(removed)
    }

    async fn count(&self, filter: Option<&PayloadFilter>) -> Result<usize, RagError> {
        let (clause, bind) = Self::filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM vectors{}", clause);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let count = query
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::upstream)?;

        Ok(count as usize)
    }

    async fn info(&self) -> Result<CollectionInfo, RagError> {
        let dimension = self.configured_dimension().await?.unwrap_or(0);
        let points = self.count(None).await?;
        Ok(CollectionInfo { dimension, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!("ragdocs-vec-test-{}.db", uuid::Uuid::new_v4()));
        let store = SqliteVectorStore::open(tmp).await.unwrap();
        store.ensure_collection(3).await.unwrap();
        store
    }

    fn make_point(id: &str, owner: &str, doc: &str, embedding: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.to_string(),
            embedding,
            payload: VectorPayload {
                chunk_id: format!("{}-row", id),
                document_id: doc.to_string(),
                owner_id: owner.to_string(),
                content: format!("content of {}", id),
                metadata: VectorMetadata {
                    filename: "test.txt".to_string(),
                    chunk_index: 0,
                },
            },
        }
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let store = test_store().await;

        store
            .upsert(vec![
                make_point("v1", "alice", "d1", vec![1.0, 0.0, 0.0]),
                make_point("v2", "alice", "d1", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "v1");
        assert!(results[0].score > 0.99);
        assert!(results[0].score > results[1].score);

        // A zero limit means zero hits, not a floor of one.
        let results = store.search(&[1.0, 0.0, 0.0], 0, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent_but_rejects_mismatch() {
        let store = test_store().await;
        store.ensure_collection(3).await.unwrap();
        let err = store.ensure_collection(5).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = test_store().await;
        let err = store
            .upsert(vec![make_point("v1", "alice", "d1", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn owner_filter_never_leaks_other_owners() {
        let store = test_store().await;

        store
            .upsert(vec![
                // Bob's vector is an exact match for the query.
                make_point("bob-1", "bob", "d2", vec![1.0, 0.0, 0.0]),
                make_point("alice-1", "alice", "d1", vec![0.1, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = PayloadFilter::Owner("alice".to_string());
        let results = store
            .search(&[1.0, 0.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload.owner_id, "alice");
    }

    #[tokio::test]
    async fn delete_by_filter_and_ids() {
        let store = test_store().await;

        store
            .upsert(vec![
                make_point("v1", "alice", "d1", vec![1.0, 0.0, 0.0]),
                make_point("v2", "alice", "d1", vec![0.0, 1.0, 0.0]),
                make_point("v3", "alice", "d2", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let removed = store
            .delete_by_filter(&PayloadFilter::Document("d1".to_string()))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count(None).await.unwrap(), 1);

        let removed = store.delete_by_ids(&["v3".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn info_reports_dimension_and_points() {
        let store = test_store().await;
        store
            .upsert(vec![make_point("v1", "alice", "d1", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let info = store.info().await.unwrap();
        assert_eq!(info.dimension, 3);
        assert_eq!(info.points, 1);
    }
}
