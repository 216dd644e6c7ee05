//! Chat provider clients.

use std::sync::Arc;

use crate::core::config::{ChatProviderConfig, HttpConfig};
use crate::core::errors::AppError;

mod anthropic;
mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicChat;
pub use openai::OpenAiChat;
pub use provider::ChatProvider;
pub use types::{ChatMessage, ChatRequest, Role};

/// Build the chat client for an already-validated provider selection.
pub fn build_chat_provider(
    config: &ChatProviderConfig,
    http: &HttpConfig,
) -> Result<Arc<dyn ChatProvider>, AppError> {
    match config {
        ChatProviderConfig::OpenAi { api_key, model } => Ok(Arc::new(OpenAiChat::new(
            api_key.clone(),
            model.clone(),
            http,
        )?)),
        ChatProviderConfig::Anthropic { api_key, model } => Ok(Arc::new(AnthropicChat::new(
            api_key.clone(),
            model.clone(),
            http,
        )?)),
    }
}
