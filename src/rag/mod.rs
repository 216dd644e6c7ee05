//! Retrieval-augmented generation.
//!
//! [`KnowledgeAgent`] drives the question pipeline (embed, retrieve,
//! compose, generate) and bulk ingestion; [`compose_agent`] wires it to
//! the configured providers and store.

use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::errors::AppError;
use crate::embeddings::OpenAiEmbeddings;
use crate::llm::build_chat_provider;
use crate::store::SqliteVectorStore;

mod agent;
mod context;

pub use agent::{IngestReport, KnowledgeAgent};
pub use context::ContextBuilder;

/// Compose an agent from configuration: chat provider, embeddings client,
/// and vector store are built here and injected.
pub async fn compose_agent(config: &AppConfig) -> Result<KnowledgeAgent, AppError> {
    let chat_provider = build_chat_provider(&config.chat_provider, &config.http)?;
    let embeddings = Arc::new(OpenAiEmbeddings::new(&config.embeddings, &config.http)?);
    let store = Arc::new(
        SqliteVectorStore::open(&config.store.directory, &config.store.store_name).await?,
    );

    tracing::info!(
        "agent ready: provider={} model={} store={}",
        config.chat_provider.provider_name(),
        config.chat_provider.model(),
        config.store.store_name
    );

    Ok(KnowledgeAgent::new(
        chat_provider,
        embeddings,
        store,
        config.agent.clone(),
    ))
}
