use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::ChatProvider;
use super::types::ChatRequest;
use crate::core::config::HttpConfig;
use crate::core::errors::{AppError, ProviderError, ProviderErrorKind};
use crate::core::retry::{with_retry, RetryConfig};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: String, http: &HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(http.request_timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::new(http.max_retries),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(m) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(m));
            }
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
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

        Ok(res)
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let body = self.request_body(request, false);

        let payload: Value = with_retry(&self.retry, || async {
            self.send(&body).await?.json().await.map_err(|err| {
                ProviderError::new(PROVIDER, ProviderErrorKind::MalformedResponse, err.to_string())
            })
        })
        .await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::MalformedResponse,
                    "missing choices[0].message.content",
                )
            })
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let body = self.request_body(request, true);
        let res = with_retry(&self.retry, || self.send(&body)).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // SSE chunks can split lines; carry the tail between reads.
            let mut pending = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        pending.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(newline) = pending.find('\n') {
                            let line = pending[..newline].trim().to_string();
                            pending.drain(..=newline);

                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }

                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(event) = serde_json::from_str::<Value>(data) {
                                    if let Some(content) =
                                        event["choices"][0]["delta"]["content"].as_str()
                                    {
                                        if !content.is_empty()
                                            && tx.send(Ok(content.to_string())).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx
                            .send(Err(ProviderError::from_reqwest(PROVIDER, err)))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
