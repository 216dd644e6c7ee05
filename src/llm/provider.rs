use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::ProviderError;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic").
    fn name(&self) -> &str;

    /// Chat completion (non-streaming).
    async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError>;

    /// Chat completion (streaming); the receiver yields response fragments
    /// in generation order.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError>;
}
