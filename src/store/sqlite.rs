//! SQLite-backed vector store.
//!
//! Metadata lives in SQLite; similarity search is brute-force cosine over
//! the stored embeddings. WAL journaling gives concurrent readers with
//! serialized writers, and durability across restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{Document, SearchResult, VectorStore};
use crate::core::errors::AppError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the database file for a logical store name.
    pub async fn open(directory: &Path, store_name: &str) -> Result<Self, AppError> {
        std::fs::create_dir_all(directory).map_err(AppError::storage)?;
        Self::with_path(directory.join(format!("{store_name}.db"))).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, AppError> {
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
            .map_err(AppError::storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(AppError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)")
            .execute(&self.pool)
            .await
            .map_err(AppError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(AppError::storage)?;

        Ok(())
    }

    async fn stored_dimension(&self) -> Result<Option<usize>, AppError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::storage)?;
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

    fn row_to_document(row: &sqlx::sqlite::SqliteRow, embedding: Vec<f32>) -> Document {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<Value>(&metadata_str).ok();

        Document {
            id: row.get("id"),
            content: row.get("content"),
            source: row.get("source"),
            metadata,
            embedding: Some(embedding),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entries: Vec<(Document, Vec<f32>)>) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }

        let dim = entries[0].1.len();
        if dim == 0 {
            return Err(AppError::Storage("refusing to store an empty embedding".into()));
        }
        for (document, embedding) in &entries {
            if embedding.len() != dim {
                return Err(AppError::Storage(format!(
                    "embedding dimension mismatch within batch: '{}' has {}, expected {}",
                    document.id,
                    embedding.len(),
                    dim
                )));
            }
        }

        if let Some(stored) = self.stored_dimension().await? {
            if stored != dim {
                return Err(AppError::Storage(format!(
                    "embedding dimension mismatch: store holds {stored}-dimensional vectors, got {dim}"
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(AppError::storage)?;

        sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES ('dimension', ?1)")
            .bind(dim.to_string())
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage)?;

        for (document, embedding) in &entries {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = document
                .metadata
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO documents (id, content, source, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&document.id)
            .bind(&document.content)
            .bind(&document.source)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage)?;
        }

        tx.commit().await.map_err(AppError::storage)?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>, AppError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        match self.stored_dimension().await? {
            None => return Ok(Vec::new()),
            Some(stored) if stored != embedding.len() => {
                return Err(AppError::Storage(format!(
                    "query dimension mismatch: store holds {stored}-dimensional vectors, got {}",
                    embedding.len()
                )));
            }
            Some(_) => {}
        }

        let rows = sqlx::query(
            "SELECT rowid AS seq, id, content, source, metadata, embedding FROM documents",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::storage)?;

        let mut scored: Vec<(SearchResult, i64)> = rows
            .iter()
            .map(|row| {
                let seq: i64 = row.get("seq");
                let blob: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&blob);
                let score = Self::cosine_similarity(embedding, &stored);
                (
                    SearchResult {
                        document: Self::row_to_document(row, stored),
                        score,
                    },
                    seq,
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(result, _)| result).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::storage)?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(dir: &Path) -> SqliteVectorStore {
        SqliteVectorStore::open(dir, "test_store").await.unwrap()
    }

    fn make_document(id: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            content: content.to_string(),
            source: "test.md".to_string(),
            metadata: Some(serde_json::json!({ "chunk_index": 0 })),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn a_stored_vector_finds_its_own_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let vector = vec![0.1, 0.7, 0.2];
        store
            .upsert(vec![(make_document("d1", "hello"), vector.clone())])
            .await
            .unwrap();

        let results = store.query(&vector, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "d1");
        assert!(results[0].score > 0.99);
        assert_eq!(results[0].document.embedding.as_deref(), Some(&vector[..]));
    }

    #[tokio::test]
    async fn upsert_overwrites_instead_of_growing() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;

        store
            .upsert(vec![(make_document("d1", "first"), vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(vec![(make_document("d1", "second"), vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].document.content, "second");
    }

    #[tokio::test]
    async fn deleted_ids_never_come_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let vector = vec![1.0, 0.0];
        store
            .upsert(vec![(make_document("d1", "gone soon"), vector.clone())])
            .await
            .unwrap();

        assert!(store.delete("d1").await.unwrap());
        assert!(!store.delete("d1").await.unwrap());

        let results = store.query(&vector, 5).await.unwrap();
        assert!(results.iter().all(|r| r.document.id != "d1"));
    }

    #[tokio::test]
    async fn query_returns_at_most_what_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;

        store
            .upsert(vec![
                (make_document("d1", "one"), vec![1.0, 0.0]),
                (make_document("d2", "two"), vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn equal_scores_rank_by_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let vector = vec![0.5, 0.5];
        store
            .upsert(vec![
                (make_document("earlier", "a"), vector.clone()),
                (make_document("later", "b"), vector.clone()),
            ])
            .await
            .unwrap();

        let results = store.query(&vector, 2).await.unwrap();
        assert_eq!(results[0].document.id, "earlier");
        assert_eq!(results[1].document.id, "later");
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;

        store
            .upsert(vec![(make_document("d1", "3d"), vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let err = store
            .upsert(vec![(make_document("d2", "2d"), vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let err = store.query(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn entries_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = test_store(dir.path()).await;
            store
                .upsert(vec![(make_document("d1", "durable"), vec![1.0, 0.0])])
                .await
                .unwrap();
        }

        let reopened = test_store(dir.path()).await;
        assert_eq!(reopened.count().await.unwrap(), 1);
        let results = reopened.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].document.content, "durable");
    }
}
