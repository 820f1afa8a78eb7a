//! LLM backend contract and provider implementations.
//!
//! Every logical role (classifier, synthesizer, summarizer) talks to an
//! ordered [`FallbackChain`] of [`ChatBackend`]s. Failure classification is
//! the load-bearing part: only transient failures (rate limits, 5xx,
//! connect/timeout) advance the chain; auth and bad-request failures
//! propagate immediately.

pub mod chains;
pub mod claude;
pub mod fallback;
pub mod gemini;
pub mod openai;

pub use chains::{build_role_chains, RoleChains};
pub use fallback::{FallbackChain, LlmError};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Author role of one prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Failure modes of one backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    /// HTTP-level failure. `is_retryable` drives fallback advancement.
    #[error("{message}{}", .status_code.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Http {
        status_code: Option<u16>,
        message: String,
        is_retryable: bool,
        retry_after: Option<Duration>,
    },

    /// Authentication/authorization failure. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request itself was rejected as malformed. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered but without usable text.
    #[error("empty response: {0}")]
    EmptyResponse(String),

    /// The provider's response body could not be parsed.
    #[error("response parse failure: {0}")]
    Parse(String),
}

impl BackendError {
    /// True only for rate-limit and transient-server-class failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http {
                is_retryable: true,
                ..
            }
        )
    }
}

/// Uniform text-generation contract: ordered messages in, text out.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name used in logs and chain configuration.
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;
}

impl std::fmt::Debug for dyn ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend").field("name", &self.name()).finish()
    }
}

/// Maps an HTTP status + error body to a [`BackendError`], shared by the
/// provider agents. 429 and 5xx advance fallback chains; 401/403 are auth
/// failures; everything else is a non-retryable request failure.
pub(crate) fn map_http_error(
    status: u16,
    message: String,
    retry_after: Option<Duration>,
) -> BackendError {
    match status {
        401 | 403 => BackendError::Auth(message),
        429 | 500 | 502 | 503 | 504 => BackendError::Http {
            status_code: Some(status),
            message,
            is_retryable: true,
            retry_after,
        },
        400 | 422 => BackendError::InvalidRequest(message),
        _ => BackendError::Http {
            status_code: Some(status),
            message,
            is_retryable: false,
            retry_after: None,
        },
    }
}

pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> BackendError {
    BackendError::Http {
        status_code: None,
        message: format!("{provider} request failed: {err}"),
        is_retryable: err.is_connect() || err.is_timeout(),
        retry_after: None,
    }
}

pub(crate) fn parse_retry_after(header: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // HTTP-date form is not handled; providers send integer seconds.
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = map_http_error(429, "slow down".into(), None);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            assert!(map_http_error(status, "oops".into(), None).is_retryable());
        }
    }

    #[test]
    fn test_auth_is_fatal() {
        let err = map_http_error(401, "bad key".into(), None);
        assert!(!err.is_retryable());
        assert!(matches!(err, BackendError::Auth(_)));
    }

    #[test]
    fn test_bad_request_is_fatal() {
        let err = map_http_error(400, "malformed".into(), None);
        assert!(!err.is_retryable());
        assert!(matches!(err, BackendError::InvalidRequest(_)));
    }
}
