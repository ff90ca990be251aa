//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/regrisk/) and project (.regrisk/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::backoff::BackoffConfig;
use crate::ai::prompt::PromptOptions;
use crate::ai::rate_window::RateWindowConfig;
use crate::ai::retry::RetryPolicy;
use crate::constants::{fetch, network, prompt, retry, throttle, tokens};
use crate::types::{RegriskError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Local rate limiting and retry settings
    pub throttle: ThrottleConfig,

    /// Prompt assembly settings
    pub prompt: PromptConfig,

    /// Source host settings
    pub fetch: FetchConfig,

    /// Ticket tracker settings
    pub tracker: TrackerConfig,

    /// Output settings
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            throttle: ThrottleConfig::default(),
            prompt: PromptConfig::default(),
            fetch: FetchConfig::default(),
            tracker: TrackerConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `RegriskError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RegriskError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(RegriskError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.throttle.tokens_per_minute == 0 {
            return Err(RegriskError::Config(
                "throttle.tokens_per_minute must be greater than 0".to_string(),
            ));
        }

        if self.throttle.base_delay_ms > self.throttle.max_delay_ms {
            return Err(RegriskError::Config(format!(
                "throttle.base_delay_ms ({}) must not exceed throttle.max_delay_ms ({})",
                self.throttle.base_delay_ms, self.throttle.max_delay_ms
            )));
        }

        if self.prompt.chars_per_token == 0 {
            return Err(RegriskError::Config(
                "prompt.chars_per_token must be greater than 0".to_string(),
            ));
        }

        if self.fetch.history_concurrency == 0 {
            return Err(RegriskError::Config(
                "fetch.history_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.fetch.max_history_commits == Some(0) {
            return Err(RegriskError::Config(
                "fetch.max_history_commits must be greater than 0 when set".to_string(),
            ));
        }

        for pattern in &self.fetch.exclude_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                RegriskError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type: "gemini", "openai"
    pub provider: String,

    /// Model name (provider-specific)
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Temperature for generation
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_output_tokens: u32,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// API key; normally taken from the provider's env var instead.
    /// Never serialized to output.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.2,
            max_output_tokens: 4096,
            api_base: None,
            api_key: None,
        }
    }
}

// =============================================================================
// Throttle Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Local per-minute token ceiling (provider limits vary by plan)
    pub tokens_per_minute: u64,

    /// Extra wait after a full window (milliseconds)
    pub window_buffer_ms: u64,

    /// Pause between files (milliseconds)
    pub inter_request_delay_ms: u64,

    /// Retries after the first attempt on rate limiting
    pub max_retries: u32,

    /// Backoff base delay (milliseconds)
    pub base_delay_ms: u64,

    /// Backoff cap (milliseconds)
    pub max_delay_ms: u64,

    /// Backoff floor (milliseconds)
    pub min_delay_ms: u64,

    /// Added to provider retry hints (milliseconds)
    pub retry_hint_buffer_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: throttle::TOKENS_PER_MINUTE,
            window_buffer_ms: throttle::WINDOW_BUFFER_MS,
            inter_request_delay_ms: throttle::INTER_REQUEST_DELAY_MS,
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
            min_delay_ms: retry::MIN_DELAY_MS,
            retry_hint_buffer_ms: retry::RETRY_HINT_BUFFER_MS,
        }
    }
}

impl ThrottleConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                floor: Duration::from_millis(self.min_delay_ms),
                jitter_ratio: retry::JITTER_RATIO,
            },
            hint_buffer: Duration::from_millis(self.retry_hint_buffer_ms),
        }
    }

    pub fn rate_window(&self) -> RateWindowConfig {
        RateWindowConfig {
            ceiling: self.tokens_per_minute,
            window: Duration::from_millis(throttle::WINDOW_MS),
            buffer: Duration::from_millis(self.window_buffer_ms),
        }
    }

    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.inter_request_delay_ms)
    }
}

// =============================================================================
// Prompt Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Characters per estimated token
    pub chars_per_token: usize,

    /// Commit messages are cut to this many characters
    pub max_commit_message_chars: usize,

    /// Estimated size above which a prompt is reported as large
    pub large_prompt_threshold: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            chars_per_token: tokens::CHARS_PER_TOKEN,
            max_commit_message_chars: prompt::MAX_COMMIT_MESSAGE_CHARS,
            large_prompt_threshold: tokens::LARGE_PROMPT_THRESHOLD,
        }
    }
}

impl PromptConfig {
    pub fn options(&self) -> PromptOptions {
        PromptOptions {
            max_commit_message_chars: self.max_commit_message_chars,
        }
    }
}

// =============================================================================
// Fetch Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// GitHub REST endpoint
    pub github_api: String,

    /// Concurrent per-file history fetches
    pub history_concurrency: usize,

    /// Optional cap on commits pulled per file; full history when unset
    pub max_history_commits: Option<usize>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Regexes for paths that are never analyzed
    pub exclude_patterns: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            github_api: fetch::GITHUB_API.to_string(),
            history_concurrency: fetch::HISTORY_CONCURRENCY,
            max_history_commits: None,
            timeout_secs: network::FETCH_TIMEOUT_SECS,
            exclude_patterns: vec![
                r"(^|/)migrations?/".to_string(),
                r"(^|/)(generated|__generated__|gen)/".to_string(),
                r"\.generated\.".to_string(),
                r"\.(spec|test)\.[^/]+$".to_string(),
                r"(^|/)__tests__/".to_string(),
                r"(^|/)(package-lock\.json|yarn\.lock|pnpm-lock\.yaml|Cargo\.lock)$".to_string(),
            ],
        }
    }
}

// =============================================================================
// Tracker Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Jira base URL, e.g. https://acme.atlassian.net; tickets are skipped when unset
    pub jira_base_url: Option<String>,
}

// =============================================================================
// Output Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for evidence snapshots
    pub snapshot_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from(".regrisk/snapshots"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
