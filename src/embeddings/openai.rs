use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::EmbeddingsProvider;
use crate::core::config::{EmbeddingsConfig, HttpConfig};
use crate::core::errors::{AppError, ProviderError, ProviderErrorKind};
use crate::core::retry::{with_retry, RetryConfig};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingsConfig, http: &HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(http.request_timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::new(http.max_retries),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, err))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(PROVIDER, status.as_u16(), text));
        }

        res.json().await.map_err(|err| {
            ProviderError::new(PROVIDER, ProviderErrorKind::MalformedResponse, err.to_string())
        })
    }
}

#[async_trait]
impl EmbeddingsProvider for OpenAiEmbeddings {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            ProviderError::new(
                PROVIDER,
                ProviderErrorKind::MalformedResponse,
                "embeddings response was empty",
            )
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let payload = with_retry(&self.retry, || self.request(&body)).await?;
        parse_embeddings(&payload, texts.len())
    }
}

/// Pull the vectors out of an embeddings response, restoring input order
/// via the `index` field and checking the count matches what was sent.
fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    let items = payload["data"].as_array().ok_or_else(|| {
        ProviderError::new(
            PROVIDER,
            ProviderErrorKind::MalformedResponse,
            "missing data array",
        )
    })?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(items.len());
    for item in items {
        let index = item["index"].as_u64().ok_or_else(|| {
            ProviderError::new(
                PROVIDER,
                ProviderErrorKind::MalformedResponse,
                "missing index on embedding entry",
            )
        })? as usize;

        let vector: Vec<f32> = item["embedding"]
            .as_array()
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::MalformedResponse,
                    "missing embedding values",
                )
            })?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);

    if indexed.len() != expected {
        return Err(ProviderError::new(
            PROVIDER,
            ProviderErrorKind::MalformedResponse,
            format!(
                "embedding count mismatch: sent {expected}, received {}",
                indexed.len()
            ),
        ));
    }

    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
