//! Domain model for operations: registry definitions, classifier-produced
//! requests and the transient records streamed to clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A registry entry describing one named operation and its parameter contract.
///
/// Loaded once at startup; a registry reload produces a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub optional_parameters: Vec<String>,
}

/// An operation the classifier planned, before validation and dispatch.
///
/// Not persisted on its own; always embedded in an [`OperationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Lifecycle status of an operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Success,
    Failed,
    CancelRequested,
}

impl OperationStatus {
    /// Terminal states receive no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// A transient, in-memory record of one operation's progress for a session.
///
/// Owned by the event bus; mutated only through the dispatcher's lifecycle
/// calls. All records for a session are dropped when a new query arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub name: String,
    pub parameters: Map<String, Value>,
    pub session_id: String,
    pub status: OperationStatus,
    pub created_at: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    /// Latched on the first `cancel_requested` write; later status writes
    /// never clear it.
    #[serde(default)]
    pub cancel_requested: bool,
}

impl OperationRecord {
    /// Creates a fresh pending record with a generated id.
    pub fn new(name: impl Into<String>, parameters: Map<String, Value>, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            parameters,
            session_id: session_id.into(),
            status: OperationStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            result: None,
            cancel_requested: false,
        }
    }
}

/// Identity of the user on whose behalf an operation runs.
///
/// Operations touching per-user state fail without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}
