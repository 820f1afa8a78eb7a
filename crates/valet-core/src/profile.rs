//! User profile model and persistence trait.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Compact per-user snapshot included in classification prompts and used to
/// derive the caller identity for identity-requiring operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            name: String::new(),
            timezone: None,
            preferences: Vec::new(),
        }
    }
}

impl UserProfile {
    /// Renders the profile as a short prompt snippet.
    pub fn render_snapshot(&self) -> String {
        let mut lines = Vec::new();
        if !self.name.is_empty() {
            lines.push(format!("Name: {}", self.name));
        }
        if let Some(tz) = &self.timezone {
            lines.push(format!("Timezone: {tz}"));
        }
        if !self.preferences.is_empty() {
            lines.push(format!("Preferences: {}", self.preferences.join("; ")));
        }
        if lines.is_empty() {
            "(no profile data)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Storage backend for the user profile.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load(&self) -> Result<Option<UserProfile>>;

    async fn save(&self, profile: &UserProfile) -> Result<()>;
}
