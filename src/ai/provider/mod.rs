//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait used by the batch orchestrator.
//! Providers return the model's free-text answer or a classified [`LlmError`];
//! retrying is left to the retry driver.
//!
//! ## Modules
//!
//! - `gemini`: Google Generative Language API
//! - `openai`: OpenAI-compatible Chat Completions API
//! - `retry_hint`: parsing of provider-supplied retry delays

mod gemini;
mod openai;
pub mod retry_hint;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::constants::network::USER_AGENT;
use crate::types::{RegriskError, Result};

/// System instruction shared by all providers
pub(crate) const SYSTEM_INSTRUCTION: &str = "You are a senior software engineer reviewing pull requests for regression risk. \
Answer in Markdown. Be specific and cite the commits and tickets you rely on.";

/// Shared LLM provider type
pub type SharedProvider = Arc<dyn LlmProvider>;

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Single-shot text generation
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a free-text answer for `prompt`
    async fn generate(&self, prompt: &str) -> std::result::Result<String, LlmError>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &LlmConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        _ => Err(RegriskError::Config(format!(
            "Unknown provider: {}. Supported: gemini, openai",
            config.provider
        ))),
    }
}

/// Key from config, falling back to the provider's environment variable
fn resolve_api_key(config: &LlmConfig, env_var: &str, provider: &str) -> Result<String> {
    config
        .api_key
        .clone()
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            RegriskError::Config(format!(
                "{} API key not found. Set {} env var or provide llm.api_key in config",
                provider, env_var
            ))
        })
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RegriskError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Classify a transport-level failure (no HTTP response)
fn transport_error(provider: &str, err: reqwest::Error) -> LlmError {
    // URLs can carry the API key as a query parameter
    let err = err.without_url();
    ErrorClassifier::classify(&format!("{} request failed: {}", provider, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = LlmConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        match create_provider(&config) {
            Err(RegriskError::Config(msg)) => assert!(msg.contains("mystery")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("unknown provider accepted"),
        }
    }

    #[test]
    fn test_configured_key_wins() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            api_key: Some("from-config".to_string()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_blank_configured_key_is_ignored() {
        let config = LlmConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        // Falls through to the environment; the variable name is never set in tests
        let err = resolve_api_key(&config, "REGRISK_TEST_UNSET_KEY", "Test").unwrap_err();
        assert!(err.to_string().contains("REGRISK_TEST_UNSET_KEY"));
    }
}
