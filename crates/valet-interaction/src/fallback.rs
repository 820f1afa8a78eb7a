//! Ordered fallback across chat backends.
//!
//! A chain tries each backend in configured order. Retryable failures
//! (rate limits, transient server errors, connect problems) move on to
//! the next backend. Non-retryable failures abort the chain immediately
//! so a malformed request is not replayed against every provider.

use crate::{BackendError, ChatBackend, ChatMessage};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM backend '{backend}' failed: {source}")]
    Fatal {
        backend: String,
        #[source]
        source: BackendError,
    },
    #[error("All LLM backends exhausted for role '{role}': [{}]", .attempts.join("; "))]
    Exhausted { role: String, attempts: Vec<String> },
}

/// An ordered list of backends serving one role (classifier, synthesizer, ...).
pub struct FallbackChain {
    role: String,
    backends: Vec<Arc<dyn ChatBackend>>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("role", &self.role)
            .field("backends", &self.backend_names())
            .finish()
    }
}

impl FallbackChain {
    pub fn new(role: impl Into<String>, backends: Vec<Arc<dyn ChatBackend>>) -> Self {
        Self {
            role: role.into(),
            backends,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Runs the chat completion against each backend in order until one
    /// succeeds. Returns `LlmError::Exhausted` when every backend failed
    /// with a retryable error, `LlmError::Fatal` on the first
    /// non-retryable one.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut attempts = Vec::new();
        for backend in &self.backends {
            match backend.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() => {
                    warn!(
                        target: "valet::llm",
                        role = %self.role,
                        backend = backend.name(),
                        error = %err,
                        "backend failed, trying next in chain"
                    );
                    attempts.push(format!("{}: {}", backend.name(), err));
                }
                Err(err) => {
                    return Err(LlmError::Fatal {
                        backend: backend.name().to_string(),
                        source: err,
                    });
                }
            }
        }
        Err(LlmError::Exhausted {
            role: self.role.clone(),
            attempts,
        })
    }
}
