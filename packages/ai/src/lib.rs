#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Optional LLM review of normalization output.
//!
//! Supports Anthropic Claude and `OpenAI` chat models behind one
//! [`providers::LlmProvider`] trait. Credentials come from the environment;
//! when none are set, [`review::ValidationOracle::from_env`] returns `None`
//! and callers fall back to heuristic checks only.

pub mod providers;
pub mod review;

use thiserror::Error;

/// Errors that can occur during AI operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request to the provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider answered with an error or an unusable body.
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// Missing or invalid credentials.
    #[error("Configuration error: {message}")]
    Config { message: String },
}
