//! Embeddings provider abstraction.

use async_trait::async_trait;

use crate::core::errors::ProviderError;

mod openai;

pub use openai::OpenAiEmbeddings;

#[async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    /// Provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Embed a single text span.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed a batch, order-preserving: output length equals input length.
    /// An empty batch returns an empty list without a network call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}
