//! Google Gemini Provider
//!
//! LLM provider using the Generative Language `generateContent` endpoint.
//! Throttling surfaces as HTTP 429 / `RESOURCE_EXHAUSTED` with a
//! `google.rpc.RetryInfo` detail carrying `retryDelay`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use super::retry_hint::{
    parse_retry_after_header, parse_retry_delay, parse_retry_delay_from_message,
};
use super::{
    ErrorClassifier, LlmError, LlmProvider, SYSTEM_INSTRUCTION, http_client, resolve_api_key,
    transport_error,
};
use crate::config::LlmConfig;
use crate::types::Result;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API provider with secure API key handling
pub struct GeminiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(config, "GEMINI_API_KEY", "Gemini")?;

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
            max_output_tokens: config.max_output_tokens,
            client: http_client(config.timeout_secs)?,
        })
    }

    fn build_request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(SYSTEM_INSTRUCTION.to_string()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        let start_time = Instant::now();
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        debug!("Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let err = error_from_response(status.as_u16(), retry_after.as_deref(), &body);
            warn!(status = status.as_u16(), category = %err.category, "Gemini API error");
            return Err(err);
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            ErrorClassifier::classify(&format!(
                "Failed to parse Gemini response: {}",
                e.without_url()
            ))
        })?;

        debug!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Received response from Gemini"
        );
        extract_text(body)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build a classified error from a non-2xx Gemini response
fn error_from_response(status: u16, retry_after_header: Option<&str>, body: &str) -> LlmError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();

    let (message, details) = match envelope {
        Some(ErrorEnvelope { error }) => (
            match error.status {
                Some(rpc_status) => format!("{}: {}", rpc_status, error.message),
                None => error.message,
            },
            error.details,
        ),
        None if body.trim().is_empty() => (format!("HTTP {}", status), Vec::new()),
        None => (body.trim().to_string(), Vec::new()),
    };

    let hint = details
        .iter()
        .find_map(|d| d.get("retryDelay"))
        .and_then(parse_retry_delay)
        .or_else(|| retry_after_header.and_then(parse_retry_after_header))
        .or_else(|| parse_retry_delay_from_message(&message));

    ErrorClassifier::classify_http_status(status, &format!("Gemini API error: {}", message))
        .maybe_retry_after(hint)
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: GenerateContentResponse) -> std::result::Result<String, LlmError> {
    let Some(candidate) = body.candidates.into_iter().next() else {
        let reason = body
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(LlmError::fatal(format!(
            "Gemini returned no answer: {}",
            reason
        )));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "empty content".to_string());
        return Err(LlmError::new(
            crate::types::ErrorCategory::Unknown,
            format!("Gemini returned empty content: {}", reason),
        ));
    }

    Ok(text)
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;
    use std::time::Duration;

    const QUOTA_BODY: &str = r#"{
      "error": {
        "code": 429,
        "message": "You exceeded your current quota. Please retry in 17.532s.",
        "status": "RESOURCE_EXHAUSTED",
        "details": [
          {"@type": "type.googleapis.com/google.rpc.QuotaFailure", "violations": []},
          {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "17s"}
        ]
      }
    }"#;

    #[test]
    fn test_quota_error_uses_retry_info() {
        let err = error_from_response(429, None, QUOTA_BODY);
        assert_eq!(err.category, ErrorCategory::RateLimited);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.retry_after, Some(Duration::from_secs(17)));
        assert!(err.message.contains("RESOURCE_EXHAUSTED"));
    }

    #[test]
    fn test_message_hint_used_without_retry_info() {
        let body = r#"{"error":{"code":429,"message":"Please retry in 4s.","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = error_from_response(429, None, body);
        assert_eq!(err.retry_after, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_unparseable_hint_falls_back_to_none() {
        let body = r#"{"error":{"code":429,"message":"slow down","status":"RESOURCE_EXHAUSTED","details":[{"retryDelay":"later"}]}}"#;
        let err = error_from_response(429, None, body);
        assert_eq!(err.category, ErrorCategory::RateLimited);
        assert_eq!(err.retry_after, None);
    }

    #[test]
    fn test_invalid_key_is_fatal() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let err = error_from_response(400, None, body);
        assert_eq!(err.category, ErrorCategory::Fatal);
        assert_eq!(err.retry_after, None);
    }

    #[test]
    fn test_non_json_body() {
        let err = error_from_response(503, Some("9"), "upstream unavailable");
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert_eq!(err.retry_after, Some(Duration::from_secs(9)));
        assert!(err.message.contains("upstream unavailable"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Risk: "},{"text":"LOW"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "Risk: LOW");
    }

    #[test]
    fn test_blocked_prompt_is_fatal() {
        let body: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = extract_text(body).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Fatal);
        assert!(err.message.contains("SAFETY"));
    }

    #[test]
    fn test_request_shape() {
        let config = LlmConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let provider = GeminiProvider::new(&config).unwrap();
        let json = serde_json::to_value(provider.build_request("hello")).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
        assert!(json["systemInstruction"].get("role").is_none());
        assert!(!format!("{:?}", provider).contains("\"k\""));
    }
}
