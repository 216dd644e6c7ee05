//! Configuration loading.
//!
//! All environment reads happen here, once, producing an immutable
//! [`AppConfig`] that is passed explicitly to every component. Provider
//! selection is validated eagerly, so a misconfigured run fails before
//! any network client is constructed.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::errors::AppError;

/// Rendered into the `UnsupportedProvider` error message.
pub const SUPPORTED_PROVIDERS: &str = "openai, anthropic";

mod defaults {
    pub const AI_PROVIDER: &str = "anthropic";
    pub const OPENAI_MODEL: &str = "gpt-4-turbo-preview";
    pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
    pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
    pub const VECTOR_STORE_DIR: &str = "storage/vectors";
    pub const STORE_NAME: &str = "knowledge_bot";
    pub const KNOWLEDGE_DIR: &str = "knowledge";
    pub const LOG_DIR: &str = "storage/logs";
    pub const TOP_K: usize = 5;
    pub const CHUNK_MAX_CHARS: usize = 1000;
    pub const CHUNK_OVERLAP_CHARS: usize = 100;
    pub const MAX_CONTEXT_CHARS: usize = 4000;
    pub const HISTORY_LIMIT: usize = 20;
    pub const INGEST_CONCURRENCY: usize = 4;
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
    pub const MAX_RETRIES: usize = 3;
    pub const SYSTEM_PROMPT: &str = "You are a helpful knowledge base assistant. \
Answer using the provided knowledge base excerpts when they are relevant, \
and say plainly when they do not cover the question.";
}

/// The chat provider, selected by `AI_PROVIDER`. Each variant carries the
/// configuration it needs, so an instance is valid by construction.
#[derive(Debug, Clone)]
pub enum ChatProviderConfig {
    OpenAi { api_key: String, model: String },
    Anthropic { api_key: String, model: String },
}

impl ChatProviderConfig {
    pub fn provider_name(&self) -> &'static str {
        match self {
            ChatProviderConfig::OpenAi { .. } => "openai",
            ChatProviderConfig::Anthropic { .. } => "anthropic",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ChatProviderConfig::OpenAi { model, .. } => model,
            ChatProviderConfig::Anthropic { model, .. } => model,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub directory: PathBuf,
    /// Logical store name; one database file per name.
    pub store_name: String,
}

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    pub top_k: usize,
    pub history_limit: usize,
    pub max_context_chars: usize,
    pub ingest_concurrency: usize,
    pub streaming: bool,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub request_timeout: Duration,
    pub max_retries: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chat_provider: ChatProviderConfig,
    pub embeddings: EmbeddingsConfig,
    pub store: StoreConfig,
    pub chunking: ChunkConfig,
    pub agent: AgentConfig,
    pub http: HttpConfig,
    pub knowledge_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Load from the process environment, honoring a `.env` file when
    /// present.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = string_or(&lookup, "AI_PROVIDER", defaults::AI_PROVIDER).to_lowercase();
        let chat_provider = match provider.as_str() {
            "openai" => ChatProviderConfig::OpenAi {
                api_key: require(&lookup, "OPENAI_API_KEY")?,
                model: string_or(&lookup, "OPENAI_MODEL", defaults::OPENAI_MODEL),
            },
            "anthropic" => ChatProviderConfig::Anthropic {
                api_key: require(&lookup, "ANTHROPIC_API_KEY")?,
                model: string_or(&lookup, "ANTHROPIC_MODEL", defaults::ANTHROPIC_MODEL),
            },
            other => {
                return Err(AppError::UnsupportedProvider {
                    value: other.to_string(),
                    supported: SUPPORTED_PROVIDERS,
                })
            }
        };

        // Embeddings always go through the OpenAI API, as a separate
        // capability from the chat provider.
        let embeddings = EmbeddingsConfig {
            api_key: require(&lookup, "OPENAI_API_KEY")?,
            model: string_or(
                &lookup,
                "OPENAI_EMBEDDING_MODEL",
                defaults::OPENAI_EMBEDDING_MODEL,
            ),
        };

        let chunking = ChunkConfig {
            max_chars: parse_or(&lookup, "CHUNK_MAX_CHARS", defaults::CHUNK_MAX_CHARS)?,
            overlap_chars: parse_or(
                &lookup,
                "CHUNK_OVERLAP_CHARS",
                defaults::CHUNK_OVERLAP_CHARS,
            )?,
        };
        if chunking.max_chars == 0 {
            return Err(AppError::Config(
                "CHUNK_MAX_CHARS must be greater than zero".to_string(),
            ));
        }
        if chunking.overlap_chars >= chunking.max_chars {
            return Err(AppError::Config(format!(
                "CHUNK_OVERLAP_CHARS ({}) must be smaller than CHUNK_MAX_CHARS ({})",
                chunking.overlap_chars, chunking.max_chars
            )));
        }

        let agent = AgentConfig {
            system_prompt: string_or(&lookup, "SYSTEM_PROMPT", defaults::SYSTEM_PROMPT),
            top_k: parse_or(&lookup, "RAG_TOP_K", defaults::TOP_K)?,
            history_limit: parse_or(&lookup, "HISTORY_LIMIT", defaults::HISTORY_LIMIT)?,
            max_context_chars: parse_or(
                &lookup,
                "MAX_CONTEXT_CHARS",
                defaults::MAX_CONTEXT_CHARS,
            )?,
            ingest_concurrency: parse_or(
                &lookup,
                "INGEST_CONCURRENCY",
                defaults::INGEST_CONCURRENCY,
            )?
            .max(1),
            streaming: bool_or(&lookup, "STREAMING", false)?,
        };

        let http = HttpConfig {
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults::REQUEST_TIMEOUT_SECS,
            )?),
            max_retries: parse_or(&lookup, "MAX_RETRIES", defaults::MAX_RETRIES)?,
        };

        Ok(Self {
            chat_provider,
            embeddings,
            store: StoreConfig {
                directory: PathBuf::from(string_or(
                    &lookup,
                    "VECTOR_STORE_DIR",
                    defaults::VECTOR_STORE_DIR,
                )),
                store_name: string_or(&lookup, "VECTOR_STORE_NAME", defaults::STORE_NAME),
            },
            chunking,
            agent,
            http,
            knowledge_dir: PathBuf::from(string_or(
                &lookup,
                "KNOWLEDGE_DIR",
                defaults::KNOWLEDGE_DIR,
            )),
            log_dir: PathBuf::from(string_or(&lookup, "LOG_DIR", defaults::LOG_DIR)),
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Config(format!("missing required key {key}")))
}

fn string_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|err| AppError::Config(format!("invalid value for {key}: {err}"))),
        _ => Ok(default),
    }
}

fn bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(AppError::Config(format!(
                "invalid value for {key}: expected a boolean, got '{other}'"
            ))),
        },
        _ => Ok(default),
    }
}
