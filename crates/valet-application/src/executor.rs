//! Sequential agentic execution and response synthesis.

use crate::dispatcher::OperationDispatcher;
use crate::prompts::PromptEngine;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use valet_core::event_bus::OperationEventBus;
use valet_core::json_extract::extract_json_object;
use valet_core::memory::{DurableFact, MemoryStore};
use valet_core::operation::{CallerIdentity, OperationRegistry, OperationRequest, OperationStatus};
use valet_interaction::{ChatMessage, FallbackChain};

/// One queued operation: its event-bus record id plus the original request.
#[derive(Debug, Clone)]
pub struct QueuedOperation {
    pub operation_id: String,
    pub request: OperationRequest,
}

/// Runs a classifier-produced operation batch and synthesizes the reply.
pub struct AgenticExecutor {
    registry: Arc<OperationRegistry>,
    dispatcher: Arc<OperationDispatcher>,
    bus: Arc<OperationEventBus>,
    synthesizer_chain: Arc<FallbackChain>,
    prompts: Arc<PromptEngine>,
    memory: Arc<dyn MemoryStore>,
}

impl AgenticExecutor {
    pub fn new(
        registry: Arc<OperationRegistry>,
        dispatcher: Arc<OperationDispatcher>,
        bus: Arc<OperationEventBus>,
        synthesizer_chain: Arc<FallbackChain>,
        prompts: Arc<PromptEngine>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            bus,
            synthesizer_chain,
            prompts,
            memory,
        }
    }

    /// Executes the batch strictly in classifier order and returns the final
    /// user-facing message.
    ///
    /// One operation failing never aborts the rest. Before each operation the
    /// batch is checked for a client cancel request; not-yet-started
    /// operations are then failed without invocation. Mid-operation
    /// interruption is not supported.
    pub async fn run(
        &self,
        batch: &[QueuedOperation],
        user_summary: &str,
        session_id: &str,
        caller: Option<&CallerIdentity>,
    ) -> String {
        let batch_ids: Vec<String> = batch.iter().map(|op| op.operation_id.clone()).collect();
        let mut transcript: Vec<String> = Vec::with_capacity(batch.len());

        for (index, queued) in batch.iter().enumerate() {
            if self.bus.cancel_requested(&batch_ids) {
                info!(
                    target: "valet::execute",
                    session_id,
                    remaining = batch.len() - index,
                    "cancel requested, aborting remainder of batch"
                );
                for skipped in &batch[index..] {
                    self.mark_failed(&skipped.operation_id, "cancelled before start");
                    transcript.push(transcript_line(
                        false,
                        &skipped.request.name,
                        "cancelled before start",
                    ));
                }
                break;
            }

            let name = &queued.request.name;
            match self.registry.validate(name, &queued.request.parameters) {
                Err(err) => {
                    let message = err.to_string();
                    self.mark_failed(&queued.operation_id, &message);
                    transcript.push(transcript_line(false, name, &message));
                }
                Ok(normalized) => {
                    if !normalized.dropped.is_empty() {
                        warn!(
                            target: "valet::execute",
                            operation = %name,
                            dropped = ?normalized.dropped,
                            "dropping parameters outside the operation contract"
                        );
                    }
                    let outcome = self
                        .dispatcher
                        .execute(&queued.operation_id, name, &normalized.params, caller)
                        .await;
                    transcript.push(transcript_line(outcome.success, name, &outcome.message));
                }
            }
        }

        let transcript = transcript.join("\n");
        self.synthesize(user_summary, &transcript, session_id).await
    }

    /// Turns the transcript into one final message; total synthesis failure
    /// returns the transcript itself.
    async fn synthesize(&self, user_summary: &str, transcript: &str, session_id: &str) -> String {
        let prompt = match self.prompts.render_synthesize(user_summary, transcript) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(target: "valet::execute", error = %err, "synthesis prompt failed");
                return transcript.to_string();
            }
        };
        let raw = match self
            .synthesizer_chain
            .complete(&[ChatMessage::user(prompt)])
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    target: "valet::execute",
                    session_id,
                    error = %err,
                    "synthesis failed, returning transcript"
                );
                return transcript.to_string();
            }
        };

        let parsed = parse_synthesis(&raw);
        if let Some(fact) = parsed.extracted_fact {
            if let Err(err) = self
                .memory
                .record_fact(DurableFact::new(fact, session_id))
                .await
            {
                warn!(target: "valet::execute", session_id, error = %err, "failed to persist fact");
            }
        }
        parsed.response
    }

    fn mark_failed(&self, operation_id: &str, message: &str) {
        if let Err(err) = self.bus.update(
            operation_id,
            Some(OperationStatus::Failed),
            Some(message.to_string()),
        ) {
            warn!(
                target: "valet::execute",
                operation_id,
                error = %err,
                "failed to mark operation failed"
            );
        }
    }
}

fn transcript_line(success: bool, name: &str, message: &str) -> String {
    let mark = if success { '\u{2713}' } else { '\u{2717}' };
    format!("{mark} {name}: {message}")
}

struct Synthesis {
    response: String,
    extracted_fact: Option<String>,
}

#[derive(Deserialize)]
struct RawSynthesis {
    response: Option<String>,
    #[serde(default)]
    extracted_fact: Option<String>,
}

/// Raw text without a JSON object is accepted as the response itself.
fn parse_synthesis(raw: &str) -> Synthesis {
    if let Some(value) = extract_json_object(raw) {
        if let Ok(parsed) = serde_json::from_value::<RawSynthesis>(value) {
            if let Some(response) = parsed.response.filter(|r| !r.trim().is_empty()) {
                return Synthesis {
                    response,
                    extracted_fact: parsed
                        .extracted_fact
                        .filter(|f| !f.trim().is_empty()),
                };
            }
        }
    }
    Synthesis {
        response: raw.trim().to_string(),
        extracted_fact: None,
    }
}
