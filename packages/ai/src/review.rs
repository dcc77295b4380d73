//! Asks a chat model whether normalization lost information.

use serde::Deserialize;
use serde_json::Value;

use crate::AiError;
use crate::providers::{self, CompletionOptions, LlmProvider};

const SYSTEM_PROMPT: &str = "You are a data quality validator. Respond only with valid JSON.";

/// The model's judgement of one source's normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OracleVerdict {
    #[serde(default = "passed_by_default")]
    pub passed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

const fn passed_by_default() -> bool {
    true
}

impl OracleVerdict {
    fn unparseable(reason: &str) -> Self {
        Self {
            passed: true,
            warnings: vec![format!("AI validation response parsing failed: {reason}")],
            errors: Vec::new(),
            missing_fields: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// LLM-backed reviewer for normalization output.
pub struct ValidationOracle {
    provider: Box<dyn LlmProvider>,
    options: CompletionOptions,
}

impl ValidationOracle {
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider,
            options: CompletionOptions::default(),
        }
    }

    /// Builds an oracle from environment credentials, or `None` if there
    /// are none.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        match providers::create_provider_from_env() {
            Ok(provider) => {
                log::info!("AI validator initialized with {}", provider.name());
                Some(Self::new(provider))
            }
            Err(e) => {
                log::warn!("AI validation disabled: {e}");
                None
            }
        }
    }

    /// Reviews one source. `raw_summary` and `normalized_summary` are
    /// compact JSON descriptions of the raw table and the emitted points.
    ///
    /// A reply that is not JSON yields a passing verdict with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the provider request fails.
    pub async fn review(
        &self,
        source: &str,
        raw_summary: &Value,
        normalized_summary: &Value,
    ) -> Result<OracleVerdict, AiError> {
        let prompt = build_prompt(source, raw_summary, normalized_summary)?;
        let reply = self
            .provider
            .complete(SYSTEM_PROMPT, &prompt, self.options)
            .await?;

        match serde_json::from_str::<OracleVerdict>(extract_json(&reply)) {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                log::error!("Failed to parse AI response as JSON: {e}");
                Ok(OracleVerdict::unparseable(&e.to_string()))
            }
        }
    }
}

fn build_prompt(source: &str, raw: &Value, normalized: &Value) -> Result<String, AiError> {
    Ok(format!(
        "Analyze if data normalization has lost any information.\n\n\
         RAW DATA SUMMARY:\n{raw}\n\n\
         NORMALIZED DATA SUMMARY:\n{normalized}\n\n\
         SOURCE: {source}\n\n\
         Please analyze:\n\
         1. Are all important numeric fields from raw data represented in normalized metrics?\n\
         2. Are there any fields that seem to be missing?\n\
         3. Are the value ranges reasonable (no unexpected nulls or zeros)?\n\
         4. Are there any data quality issues?\n\n\
         Respond in JSON format:\n\
         {{\"passed\": true/false, \"warnings\": [], \"errors\": [], \
         \"missing_fields\": [], \"suggestions\": []}}",
        raw = serde_json::to_string_pretty(raw)?,
        normalized = serde_json::to_string_pretty(normalized)?,
    ))
}

/// Strips a Markdown code fence around a JSON reply.
#[must_use]
pub fn extract_json(reply: &str) -> &str {
    let reply = reply.trim();
    let fenced = reply
        .split_once("```json")
        .or_else(|| reply.split_once("```"))
        .map(|(_, rest)| rest.split_once("```").map_or(rest, |(body, _)| body));
    fenced.unwrap_or(reply).trim()
}
