use std::path::PathBuf;

use thiserror::Error;

/// Classification of a remote provider failure. Drives the retry policy:
/// transient failures retry, auth and malformed requests do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    InvalidRequest,
    RateLimited,
    Timeout,
    Network,
    Server,
    MalformedResponse,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProviderErrorKind::Auth => "authentication error",
            ProviderErrorKind::InvalidRequest => "invalid request",
            ProviderErrorKind::RateLimited => "rate limited",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Network => "network error",
            ProviderErrorKind::Server => "server error",
            ProviderErrorKind::MalformedResponse => "malformed response",
        };
        f.write_str(label)
    }
}

/// A failure talking to a remote LLM or embeddings API.
#[derive(Debug, Clone, Error)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub provider: &'static str,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: &'static str,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Classify a transport-level failure.
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Network
        };
        Self::new(provider, kind, err.to_string())
    }

    /// Classify a non-success HTTP status, keeping the response body as the
    /// message.
    pub fn from_status(provider: &'static str, status: u16, body: String) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            400 | 404 | 422 => ProviderErrorKind::InvalidRequest,
            429 => ProviderErrorKind::RateLimited,
            s if s >= 500 => ProviderErrorKind::Server,
            _ => ProviderErrorKind::MalformedResponse,
        };
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        Self::new(provider, kind, message)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimited
                | ProviderErrorKind::Timeout
                | ProviderErrorKind::Network
                | ProviderErrorKind::Server
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unreadable source {path}: {reason}")]
    UnreadableSource { path: PathBuf, reason: String },

    #[error("unsupported AI provider '{value}'. Supported providers: {supported}")]
    UnsupportedProvider {
        value: String,
        supported: &'static str,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn unreadable<E: std::fmt::Display>(path: &std::path::Path, err: E) -> Self {
        AppError::UnreadableSource {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        AppError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let auth = ProviderError::from_status("openai", 401, String::new());
        assert_eq!(auth.kind, ProviderErrorKind::Auth);
        assert!(!auth.is_retryable());

        let rate = ProviderError::from_status("openai", 429, "slow down".into());
        assert_eq!(rate.kind, ProviderErrorKind::RateLimited);
        assert!(rate.is_retryable());

        let server = ProviderError::from_status("anthropic", 503, String::new());
        assert_eq!(server.kind, ProviderErrorKind::Server);
        assert!(server.is_retryable());

        let bad = ProviderError::from_status("anthropic", 400, "bad field".into());
        assert_eq!(bad.kind, ProviderErrorKind::InvalidRequest);
        assert!(!bad.is_retryable());
    }

    #[test]
    fn messages_keep_the_original_body() {
        let err = ProviderError::from_status("openai", 500, "upstream exploded".into());
        assert!(err.to_string().contains("upstream exploded"));
        assert!(err.to_string().contains("openai"));
    }
}
