//! Prompt templates, compiled once at startup.

use minijinja::{context, Environment};
use valet_core::{Result, ValetError};

const CLASSIFY_TEMPLATE: &str = r#"You are the operation planner for a personal assistant.

User query:
{{ query }}

{% if attachment %}Attached document text:
{{ attachment }}

{% endif %}{% if history %}Recent conversation:
{{ history }}

{% endif %}Available operations:
{{ catalog }}

User profile:
{{ profile }}

Decide whether the query needs operations or a direct answer.
Respond with ONLY a JSON object in this shape:
{
  "operations": [{"name": "...", "parameters": {"key": "value"}, "description": "..."}],
  "user_summary": "one sentence restating what the user wants",
  "display_response": "the answer text when no operations are needed"
}
Leave "operations" empty for a direct answer. Only use operation names from the
list above. Do not wrap the JSON in markdown fences."#;

const SYNTHESIZE_TEMPLATE: &str = r#"The user asked: {{ user_summary }}

Operation results:
{{ transcript }}

Write one short reply to the user describing what happened. Acknowledge any
failed operation plainly instead of claiming success.
Respond with ONLY a JSON object:
{"response": "...", "extracted_fact": null}
Set "extracted_fact" to a short sentence only when the exchange revealed a
durable fact about the user worth remembering."#;

const SUMMARIZE_TEMPLATE: &str = r#"Summarize the following conversation in one paragraph. Keep names, facts, and
any open requests.

{{ conversation }}"#;

/// Compiled template environment shared by the classifier and executor.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("classify", CLASSIFY_TEMPLATE)
            .map_err(|e| ValetError::internal(format!("Invalid classify template: {e}")))?;
        env.add_template("synthesize", SYNTHESIZE_TEMPLATE)
            .map_err(|e| ValetError::internal(format!("Invalid synthesize template: {e}")))?;
        env.add_template("summarize", SUMMARIZE_TEMPLATE)
            .map_err(|e| ValetError::internal(format!("Invalid summarize template: {e}")))?;
        Ok(Self { env })
    }

    pub fn render_classify(
        &self,
        query: &str,
        attachment: Option<&str>,
        history: &str,
        catalog: &str,
        profile: &str,
    ) -> Result<String> {
        self.render(
            "classify",
            context! {
                query => query,
                attachment => attachment,
                history => if history.is_empty() { None } else { Some(history) },
                catalog => catalog,
                profile => profile,
            },
        )
    }

    pub fn render_synthesize(&self, user_summary: &str, transcript: &str) -> Result<String> {
        self.render(
            "synthesize",
            context! { user_summary => user_summary, transcript => transcript },
        )
    }

    pub fn render_summarize(&self, conversation: &str) -> Result<String> {
        self.render("summarize", context! { conversation => conversation })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| ValetError::internal(format!("Missing template '{name}': {e}")))?;
        template
            .render(ctx)
            .map_err(|e| ValetError::internal(format!("Failed to render '{name}': {e}")))
    }
}
