//! Session and chat-turn domain model.

use serde::{Deserialize, Serialize};

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a session's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A conversation session. The core treats the turn list as append-only and
/// reads a bounded trailing window for classification context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub turns: Vec<ChatTurn>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            created_at: now.clone(),
            updated_at: now,
            turns: Vec::new(),
        }
    }

    /// Appends a turn and refreshes `updated_at`.
    pub fn push_turn(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push(ChatTurn::new(role, content));
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// The last `window` turns, oldest first.
    pub fn trailing_window(&self, window: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }
}
