use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::ChatProvider;
use super::types::{ChatRequest, Role};
use crate::core::config::HttpConfig;
use crate::core::errors::{AppError, ProviderError, ProviderErrorKind};
use crate::core::retry::{with_retry, RetryConfig};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
// The messages API requires max_tokens; used when the request leaves it unset.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl AnthropicChat {
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

    /// System messages become the top-level `system` field; the rest keep
    /// their order as user/assistant turns.
    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns = Vec::new();

        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(&message.content),
                Role::User | Role::Assistant => turns.push(json!({
                    "role": message.role,
                    "content": message.content,
                })),
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": turns,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert("system".to_string(), json!(system_parts.join("\n\n")));
            }
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
impl ChatProvider for AnthropicChat {
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

        payload["content"][0]["text"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::MalformedResponse,
                    "missing content[0].text",
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
            let mut pending = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        pending.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(newline) = pending.find('\n') {
                            let line = pending[..newline].trim().to_string();
                            pending.drain(..=newline);

                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            let Ok(event) = serde_json::from_str::<Value>(data) else {
                                continue;
                            };

                            match event["type"].as_str() {
                                Some("content_block_delta") => {
                                    if let Some(text) = event["delta"]["text"].as_str() {
                                        if !text.is_empty()
                                            && tx.send(Ok(text.to_string())).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                                Some("message_stop") => return,
                                Some("error") => {
                                    let message = event["error"]["message"]
                                        .as_str()
                                        .unwrap_or("stream error")
                                        .to_string();
                                    let _ = tx
                                        .send(Err(ProviderError::new(
                                            PROVIDER,
                                            ProviderErrorKind::Server,
                                            message,
                                        )))
                                        .await;
                                    return;
                                }
                                _ => {}
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    fn chat_client() -> AnthropicChat {
        let http = HttpConfig {
            request_timeout: std::time::Duration::from_secs(5),
            max_retries: 1,
        };
        AnthropicChat::new("sk-ant-test".into(), "claude-3-5-sonnet-20241022".into(), &http)
            .unwrap()
    }

    #[test]
    fn system_messages_are_lifted_out_of_the_turn_list() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("be helpful"),
            ChatMessage::system("use the context"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("question"),
        ]);

        let body = chat_client().request_body(&request, false);

        assert_eq!(body["system"], "be helpful\n\nuse the context");
        let turns = body["messages"].as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["role"], "assistant");
        assert_eq!(turns[2]["content"], "question");
    }

    #[test]
    fn max_tokens_defaults_when_unset() {
        let request = ChatRequest::new(vec![ChatMessage::user("hello")]);
        let body = chat_client().request_body(&request, false);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(body.get("system").is_none());
    }
}
