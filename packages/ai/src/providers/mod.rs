//! LLM provider abstraction and implementations.

pub mod anthropic;
pub mod openai;

use crate::AiError;

/// Sampling settings for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 500,
        }
    }
}

/// A chat model that answers one prompt.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider and model, for logs.
    fn name(&self) -> String;

    /// Sends a system prompt and a user prompt, returning the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the request fails or the reply has no text.
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, AiError>;
}

/// Creates a provider from environment variables.
///
/// `AI_PROVIDER` picks the provider explicitly; otherwise the first of
/// `ANTHROPIC_API_KEY` and `OPENAI_API_KEY` that is set wins. `AI_MODEL`
/// overrides the default model.
///
/// # Errors
///
/// Returns [`AiError::Config`] if no credentials are found or the
/// requested provider is unknown or not configured.
pub fn create_provider_from_env() -> Result<Box<dyn LlmProvider>, AiError> {
    let provider = std::env::var("AI_PROVIDER")
        .ok()
        .or_else(|| detect_provider().map(str::to_owned))
        .ok_or_else(|| AiError::Config {
            message: "No AI credentials found. Set ANTHROPIC_API_KEY or OPENAI_API_KEY".to_owned(),
        })?;
    let model = std::env::var("AI_MODEL").ok();

    match provider.to_lowercase().as_str() {
        "anthropic" | "claude" => {
            let api_key = require_env("ANTHROPIC_API_KEY")?;
            let model = model.unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_owned());
            Ok(Box::new(anthropic::AnthropicProvider::new(api_key, model)))
        }
        "openai" | "gpt" => {
            let api_key = require_env("OPENAI_API_KEY")?;
            let model = model.unwrap_or_else(|| openai::DEFAULT_MODEL.to_owned());
            Ok(Box::new(openai::OpenAiProvider::new(api_key, model)))
        }
        other => Err(AiError::Config {
            message: format!("Unknown AI provider: {other}. Use 'anthropic' or 'openai'."),
        }),
    }
}

fn require_env(name: &str) -> Result<String, AiError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AiError::Config {
            message: format!("{name} environment variable not set"),
        })
}

/// Provider name implied by the credentials that are present.
fn detect_provider() -> Option<&'static str> {
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        log::info!("Auto-detected AI provider: Anthropic (ANTHROPIC_API_KEY found)");
        return Some("anthropic");
    }
    if std::env::var("OPENAI_API_KEY").is_ok() {
        log::info!("Auto-detected AI provider: OpenAI (OPENAI_API_KEY found)");
        return Some("openai");
    }
    None
}
