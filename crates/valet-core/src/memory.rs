//! Long-term memory of durable facts extracted from conversations.
//!
//! Fact persistence is fire-and-forget from the synthesizer's perspective:
//! a failed write is logged by the caller, never fatal to a workflow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A durable fact the synthesizer extracted from an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableFact {
    pub fact: String,
    pub session_id: String,
    pub recorded_at: String,
}

impl DurableFact {
    pub fn new(fact: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            fact: fact.into(),
            session_id: session_id.into(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Long-term memory collaborator.
///
/// Errors are plain strings: the caller only logs them.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn record_fact(&self, fact: DurableFact) -> Result<(), String>;

    /// Most recent facts, newest last, for folding into prompts.
    async fn recent_facts(&self, limit: usize) -> Result<Vec<DurableFact>, String>;
}

/// A no-op implementation for when no memory backend is configured.
pub struct NoOpMemoryStore;

#[async_trait]
impl MemoryStore for NoOpMemoryStore {
    async fn record_fact(&self, _fact: DurableFact) -> Result<(), String> {
        Ok(())
    }

    async fn recent_facts(&self, _limit: usize) -> Result<Vec<DurableFact>, String> {
        Ok(vec![])
    }
}
