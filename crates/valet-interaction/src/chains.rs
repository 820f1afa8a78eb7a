//! Builds the per-role fallback chains from configuration and secrets.

use crate::claude::{ClaudeBackend, DEFAULT_CLAUDE_MODEL};
use crate::fallback::FallbackChain;
use crate::gemini::{DEFAULT_GEMINI_MODEL, GeminiBackend};
use crate::openai::{DEFAULT_OPENAI_MODEL, OpenAiBackend};
use crate::ChatBackend;
use std::sync::Arc;
use tracing::info;
use valet_core::config::{ApiCredential, LlmRolesConfig, SecretConfig};
use valet_core::{Result, ValetError};

/// One fallback chain per LLM role in the pipeline.
pub struct RoleChains {
    pub classifier: FallbackChain,
    pub synthesizer: FallbackChain,
    pub summarizer: FallbackChain,
}

/// Resolves the configured backend names into concrete clients.
///
/// Credentials come from the secret store first, then from provider
/// environment variables. A name with no resolvable credential is a
/// configuration error rather than a silent skip.
pub fn build_role_chains(roles: &LlmRolesConfig, secrets: &SecretConfig) -> Result<RoleChains> {
    let classifier = build_chain("classifier", &roles.classifier, secrets)?;
    let synthesizer = build_chain("synthesizer", &roles.synthesizer, secrets)?;
    let summarizer = build_chain("summarizer", &roles.summarizer, secrets)?;
    Ok(RoleChains {
        classifier,
        synthesizer,
        summarizer,
    })
}

fn build_chain(role: &str, names: &[String], secrets: &SecretConfig) -> Result<FallbackChain> {
    if names.is_empty() {
        return Err(ValetError::config(format!(
            "No backends configured for LLM role '{role}'"
        )));
    }
    let mut backends: Vec<Arc<dyn ChatBackend>> = Vec::with_capacity(names.len());
    for name in names {
        backends.push(build_backend(name, secrets)?);
    }
    info!(
        target: "valet::llm",
        role,
        backends = ?names,
        "configured fallback chain"
    );
    Ok(FallbackChain::new(role, backends))
}

fn build_backend(name: &str, secrets: &SecretConfig) -> Result<Arc<dyn ChatBackend>> {
    match name {
        "claude" => {
            let (key, model) = resolve_credential(
                secrets.claude.as_ref(),
                "ANTHROPIC_API_KEY",
                "CLAUDE_MODEL_NAME",
                DEFAULT_CLAUDE_MODEL,
            )
            .ok_or_else(|| missing_credential("claude", "ANTHROPIC_API_KEY"))?;
            Ok(Arc::new(ClaudeBackend::new(key, model)))
        }
        "openai" => {
            let (key, model) = resolve_credential(
                secrets.openai.as_ref(),
                "OPENAI_API_KEY",
                "OPENAI_MODEL_NAME",
                DEFAULT_OPENAI_MODEL,
            )
            .ok_or_else(|| missing_credential("openai", "OPENAI_API_KEY"))?;
            Ok(Arc::new(OpenAiBackend::new(key, model)))
        }
        "gemini" => {
            let (key, model) = resolve_credential(
                secrets.gemini.as_ref(),
                "GEMINI_API_KEY",
                "GEMINI_MODEL_NAME",
                DEFAULT_GEMINI_MODEL,
            )
            .ok_or_else(|| missing_credential("gemini", "GEMINI_API_KEY"))?;
            Ok(Arc::new(GeminiBackend::new(key, model)))
        }
        other => Err(ValetError::config(format!(
            "Unknown LLM backend '{other}' (expected claude, openai, or gemini)"
        ))),
    }
}

fn resolve_credential(
    stored: Option<&ApiCredential>,
    key_env: &str,
    model_env: &str,
    default_model: &str,
) -> Option<(String, String)> {
    if let Some(credential) = stored {
        let model = credential
            .model_name
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        return Some((credential.api_key.clone(), model));
    }
    let key = std::env::var(key_env).ok().filter(|k| !k.is_empty())?;
    let model = std::env::var(model_env)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_model.to_string());
    Some((key, model))
}

fn missing_credential(backend: &str, env_var: &str) -> ValetError {
    ValetError::config(format!(
        "No API key for backend '{backend}': add it to secret.json or set {env_var}"
    ))
}
