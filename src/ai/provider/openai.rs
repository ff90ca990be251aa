//! OpenAI API Provider
//!
//! LLM provider using OpenAI's Chat Completions API (or any compatible endpoint
//! via `llm.api_base`). Throttling is reported as HTTP 429 with a `Retry-After`
//! header and a message such as "Please try again in 20s".

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, instrument, warn};

use super::retry_hint::{parse_retry_after_header, parse_retry_delay_from_message};
use super::{
    ErrorClassifier, LlmError, LlmProvider, SYSTEM_INSTRUCTION, http_client, resolve_api_key,
    transport_error,
};
use crate::config::LlmConfig;
use crate::types::Result;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(config, "OPENAI_API_KEY", "OpenAI")?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            client: http_client(config.timeout_secs)?,
        })
    }

    fn build_request(&self, prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_INSTRUCTION.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        let start_time = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        debug!("Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let err = error_from_response(status.as_u16(), retry_after.as_deref(), &body);
            warn!(status = status.as_u16(), category = %err.category, "OpenAI API error");
            return Err(err);
        }

        let response_body: ChatCompletionResponse = response.json().await.map_err(|e| {
            ErrorClassifier::classify(&format!(
                "Failed to parse OpenAI response: {}",
                e.without_url()
            ))
        })?;

        debug!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Received response from OpenAI"
        );

        response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                LlmError::new(
                    crate::types::ErrorCategory::Unknown,
                    "No content in OpenAI response",
                )
            })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build a classified error from a non-2xx OpenAI response
fn error_from_response(status: u16, retry_after_header: Option<&str>, body: &str) -> LlmError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match error.code {
            Some(code) => format!("{} ({})", error.message, code),
            None => error.message,
        },
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => body.trim().to_string(),
    };

    let hint = retry_after_header
        .and_then(parse_retry_after_header)
        .or_else(|| parse_retry_delay_from_message(&message));

    ErrorClassifier::classify_http_status(status, &format!("OpenAI API error: {}", message))
        .maybe_retry_after(hint)
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;
    use std::time::Duration;

    #[test]
    fn test_rate_limit_prefers_header() {
        let body = r#"{"error":{"message":"Rate limit reached for requests. Please try again in 20s.","type":"requests","code":"rate_limit_exceeded"}}"#;
        let err = error_from_response(429, Some("7"), body);
        assert_eq!(err.category, ErrorCategory::RateLimited);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
        assert!(err.message.contains("rate_limit_exceeded"));
    }

    #[test]
    fn test_rate_limit_message_hint() {
        let body = r#"{"error":{"message":"Rate limit reached. Please try again in 1.5s.","code":null}}"#;
        let err = error_from_response(429, None, body);
        assert_eq!(err.retry_after, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_invalid_model_is_fatal() {
        let body = r#"{"error":{"message":"The model `gpt-x` does not exist","code":"model_not_found"}}"#;
        let err = error_from_response(404, None, body);
        assert_eq!(err.category, ErrorCategory::Fatal);
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn test_empty_body() {
        let err = error_from_response(502, None, "");
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert!(err.message.contains("HTTP 502"));
    }

    #[test]
    fn test_request_shape() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("sk-test".to_string()),
            api_base: Some("http://localhost:8080/v1/".to_string()),
            ..Default::default()
        };
        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.api_base, "http://localhost:8080/v1");

        let json = serde_json::to_value(provider.build_request("hi")).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(!format!("{:?}", provider).contains("sk-test"));
    }
}
