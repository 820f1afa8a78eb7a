//! Direct/Agentic query classification.

use crate::prompts::PromptEngine;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use valet_core::json_extract::extract_json_object;
use valet_core::operation::{OperationRegistry, OperationRequest};
use valet_core::session::{ChatTurn, TurnRole};
use valet_interaction::{ChatMessage, FallbackChain, LlmError};

/// How much of an unparseable model reply survives into the degraded
/// Direct response.
const RAW_EXCERPT_CHARS: usize = 400;

/// Outcome of classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Direct {
        display_response: String,
    },
    Agentic {
        operations: Vec<OperationRequest>,
        user_summary: String,
    },
}

pub struct Classifier {
    prompts: Arc<PromptEngine>,
    classifier_chain: Arc<FallbackChain>,
    summarizer_chain: Arc<FallbackChain>,
    window_turns: usize,
    summary_trigger_chars: usize,
}

impl Classifier {
    pub fn new(
        prompts: Arc<PromptEngine>,
        classifier_chain: Arc<FallbackChain>,
        summarizer_chain: Arc<FallbackChain>,
        window_turns: usize,
        summary_trigger_chars: usize,
    ) -> Self {
        Self {
            prompts,
            classifier_chain,
            summarizer_chain,
            window_turns,
            summary_trigger_chars,
        }
    }

    /// Classifies a query into Direct or Agentic mode.
    ///
    /// Unparseable model output degrades to a Direct response carrying a
    /// truncated excerpt; only chain failures propagate as errors. Operation
    /// names are not checked against the registry here, unknown names fail
    /// individually at dispatch time.
    pub async fn classify(
        &self,
        query: &str,
        attachment_text: Option<&str>,
        turns: &[ChatTurn],
        registry: &OperationRegistry,
        profile_snapshot: &str,
    ) -> Result<Classification, LlmError> {
        let history = self.history_context(turns).await;
        let prompt = match self.prompts.render_classify(
            query,
            attachment_text,
            &history,
            &registry.render_catalog(),
            profile_snapshot,
        ) {
            Ok(prompt) => prompt,
            Err(err) => {
                // Template failures are programmer errors; degrade rather
                // than lose the query.
                warn!(target: "valet::classify", error = %err, "prompt rendering failed");
                format!("Classify this request and respond with JSON: {query}")
            }
        };

        let raw = self
            .classifier_chain
            .complete(&[ChatMessage::user(prompt)])
            .await?;
        Ok(parse_classification(&raw))
    }

    /// Renders the trailing history window, summarizing when it exceeds the
    /// configured size budget.
    async fn history_context(&self, turns: &[ChatTurn]) -> String {
        let window = if turns.len() > self.window_turns {
            &turns[turns.len() - self.window_turns..]
        } else {
            turns
        };
        let rendered = render_turns(window);
        if rendered.len() <= self.summary_trigger_chars {
            return rendered;
        }

        let prompt = match self.prompts.render_summarize(&rendered) {
            Ok(prompt) => prompt,
            Err(_) => return truncate_tail(&rendered, self.summary_trigger_chars),
        };
        match self
            .summarizer_chain
            .complete(&[ChatMessage::user(prompt)])
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                warn!(
                    target: "valet::classify",
                    error = %err,
                    "history summarization failed, using truncated tail"
                );
                truncate_tail(&rendered, self.summary_trigger_chars)
            }
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    operations: Vec<RawOperation>,
    #[serde(default)]
    user_summary: Option<String>,
    #[serde(default)]
    display_response: Option<String>,
}

#[derive(Deserialize)]
struct RawOperation {
    name: String,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    description: Option<String>,
}

/// Maps raw model output to a [`Classification`], tolerant of malformed JSON.
fn parse_classification(raw: &str) -> Classification {
    let Some(value) = extract_json_object(raw) else {
        debug!(target: "valet::classify", "no JSON object in classifier output");
        return Classification::Direct {
            display_response: truncate_tail(raw.trim(), RAW_EXCERPT_CHARS),
        };
    };
    let parsed: RawClassification = match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(target: "valet::classify", error = %err, "classifier JSON had unexpected shape");
            return Classification::Direct {
                display_response: truncate_tail(raw.trim(), RAW_EXCERPT_CHARS),
            };
        }
    };

    if parsed.operations.is_empty() {
        let display_response = parsed
            .display_response
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "I was unable to produce a response for that request.".to_string());
        return Classification::Direct { display_response };
    }

    let operations = parsed
        .operations
        .into_iter()
        .map(|op| OperationRequest {
            name: op.name,
            parameters: op.parameters,
            description: op.description,
        })
        .collect();
    let user_summary = parsed
        .user_summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "the user's request".to_string());
    Classification::Agentic {
        operations,
        user_summary,
    }
}

fn render_turns(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            format!("{role}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_tail(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let tail: String = text
        .chars()
        .skip(text.chars().count() - max_chars)
        .collect();
    format!("...{tail}")
}
