//! Configuration and secret domain types.
//!
//! Loaded by the infrastructure layer from `config.toml` / `secret.json`;
//! the core only depends on these shapes, not on any file location.

use crate::operation::OperationDefinition;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ValetConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub llm: LlmRolesConfig,
    /// Registry entries, one `[[operation]]` table per operation.
    #[serde(default, rename = "operation")]
    pub operations: Vec<OperationDefinition>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Root directory file operations are confined to.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workspace_root: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound for one operation invocation, so a wedged handler cannot
    /// hold an entire batch.
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

fn default_operation_timeout_secs() -> u64 {
    120
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HistoryConfig {
    /// Number of trailing turns included verbatim in classifier prompts.
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,
    /// Above this many characters the window is summarized instead.
    #[serde(default = "default_summary_trigger_chars")]
    pub summary_trigger_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_turns: default_window_turns(),
            summary_trigger_chars: default_summary_trigger_chars(),
        }
    }
}

fn default_window_turns() -> usize {
    12
}

fn default_summary_trigger_chars() -> usize {
    6000
}

/// Ordered backend names per logical LLM role. The first entry is the
/// primary; the rest are fallbacks tried on transient failure only.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LlmRolesConfig {
    #[serde(default = "default_chain")]
    pub classifier: Vec<String>,
    #[serde(default = "default_chain")]
    pub synthesizer: Vec<String>,
    #[serde(default = "default_chain")]
    pub summarizer: Vec<String>,
}

impl Default for LlmRolesConfig {
    fn default() -> Self {
        Self {
            classifier: default_chain(),
            synthesizer: default_chain(),
            summarizer: default_chain(),
        }
    }
}

fn default_chain() -> Vec<String> {
    vec!["claude".to_string(), "openai".to_string()]
}

/// API credentials, loaded from secret.json or environment variables.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SecretConfig {
    #[serde(default)]
    pub claude: Option<ApiCredential>,
    #[serde(default)]
    pub openai: Option<ApiCredential>,
    #[serde(default)]
    pub gemini: Option<ApiCredential>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ApiCredential {
    pub api_key: String,
    #[serde(default)]
    pub model_name: Option<String>,
}
