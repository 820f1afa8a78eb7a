//! ClaudeBackend - direct REST implementation for the Claude Messages API.

use crate::{
    map_http_error, parse_retry_after, transport_error, BackendError, ChatBackend, ChatMessage,
    ChatRole,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Backend that talks to the Claude HTTP API.
#[derive(Clone)]
pub struct ClaudeBackend {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
        }
    }

    /// Sets the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, messages: &[ChatMessage]) -> CreateMessageRequest {
        // The Messages API takes the system prompt as a top-level field.
        let system = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n\n");

        let chat = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| Message {
                role: match m.role {
                    ChatRole::Assistant => "assistant",
                    _ => "user",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        CreateMessageRequest {
            model: self.model.clone(),
            messages: chat,
            max_tokens: self.max_tokens,
            system: if system.is_empty() { None } else { Some(system) },
        }
    }
}

#[async_trait]
impl ChatBackend for ClaudeBackend {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let body = self.build_request(messages);
        let response = self
            .client
            .post(BASE_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error("Claude", &err))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Claude error body".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&body_text)
                .map(|wrapper| wrapper.error.message)
                .unwrap_or(body_text);
            return Err(map_http_error(status, message, retry_after));
        }

        let parsed: CreateMessageResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Parse(format!("Failed to parse Claude response: {err}")))?;

        parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlockResponse::Text { text } => Some(text),
            })
            .ok_or_else(|| {
                BackendError::EmptyResponse(
                    "Claude API returned no text in the response content".into(),
                )
            })
    }
}

#[derive(Serialize)]
struct CreateMessageRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockResponse {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    r#type: String,
    message: String,
}
