//! Vector store abstraction.
//!
//! Stores `(Document, embedding)` pairs and answers top-K cosine
//! similarity queries. The shipped implementation is [`SqliteVectorStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::AppError;

mod sqlite;

pub use sqlite::SqliteVectorStore;

/// A knowledge chunk as stored and retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier; upserts with the same id overwrite.
    pub id: String,
    pub content: String,
    /// Source file name.
    pub source: String,
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// One similarity search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    /// Cosine similarity, higher is better.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist entries transactionally, overwriting by document id.
    ///
    /// All vectors in a batch must share the store's embedding dimension;
    /// the first batch fixes that dimension for the store's lifetime.
    async fn upsert(&self, entries: Vec<(Document, Vec<f32>)>) -> Result<(), AppError>;

    /// Up to `k` nearest entries by cosine similarity, descending.
    /// Ties rank by insertion order, earlier first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>, AppError>;

    /// Remove an entry. Returns false if the id was absent.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    async fn count(&self) -> Result<usize, AppError>;
}
