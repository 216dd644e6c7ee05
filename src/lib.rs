//! knowledgebot: a retrieval-augmented knowledge chatbot.
//!
//! Markdown/plain-text files are chunked, embedded, and stored in a
//! SQLite-backed vector store; questions are answered by retrieving the
//! most similar chunks and handing them to a chat provider together with
//! the conversation history. See the `load-knowledge` and `chat` binaries.

pub mod core;
pub mod embeddings;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod rag;
pub mod store;

pub use crate::core::config::AppConfig;
pub use crate::core::errors::AppError;
pub use crate::rag::{compose_agent, KnowledgeAgent};
