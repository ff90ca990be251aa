//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for the retry driver.
//!
//! ## Error Categories
//!
//! - **RateLimited**: provider throttling (back off and retry)
//! - **Fatal**: malformed request, auth failure (fail fast)
//! - **Unknown**: anything else (fail fast, surfaced as-is)
//!
//! The string/status heuristics live in [`ErrorClassifier`] only; the retry
//! driver branches on [`ErrorCategory`] and never inspects messages.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Closed classification of a failed inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited or quota exhausted - wait then retry
    RateLimited,
    /// Request can never succeed as sent - don't retry
    Fatal,
    /// Unclassified failure - don't retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::Fatal => write!(f, "FATAL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Only throttling is worth retrying with the same prompt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Operator-facing hint printed next to a failed item
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::RateLimited => {
                "rate-limited: reduce prompt size, lower throttle.tokens_per_minute or raise throttle.inter_request_delay_ms"
            }
            Self::Fatal => {
                "request rejected: check API credentials, model name and prompt size"
            }
            Self::Unknown => "unexpected failure: re-run with --verbose and inspect the provider response",
        }
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Classified inference failure with optional status and retry hint
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Category used for retry decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Transport status code, when the failure came from an HTTP response
    pub status: Option<u16>,
    /// Provider-supplied wait before retrying
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}:{}] {}", self.category, status, self.message),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::RateLimited, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Fatal, message)
    }

    /// Attach the HTTP status that produced this error
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a provider retry hint
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Attach a retry hint only when one was found
    pub fn maybe_retry_after(mut self, duration: Option<Duration>) -> Self {
        if duration.is_some() {
            self.retry_after = duration;
        }
        self
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Status code providers use for throttling
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Substrings that mark a rate-limit or quota failure in provider payloads
const RATE_LIMIT_MARKERS: &[&str] = &[
    "resource_exhausted",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
];

/// A standalone 429 in the text; digits inside larger numbers don't count
static STATUS_429: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b429\b").expect("STATUS_429 regex should compile"));

/// Substrings that mark a request that will never succeed as sent
const FATAL_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "unauthorized",
    "permission denied",
    "permission_denied",
    "invalid_argument",
    "invalid argument",
    "malformed",
    "not found",
];

/// Maps provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str) -> LlmError {
        let lower = message.to_lowercase();

        if STATUS_429.is_match(&lower) || RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
            return LlmError::rate_limited(message);
        }

        if FATAL_MARKERS.iter().any(|m| lower.contains(m)) {
            return LlmError::fatal(message);
        }

        LlmError::new(ErrorCategory::Unknown, message)
    }

    /// Classify an HTTP failure; the status wins over message markers
    pub fn classify_http_status(status: u16, message: &str) -> LlmError {
        let err = match status {
            TOO_MANY_REQUESTS => LlmError::rate_limited(message),
            400 | 401 | 403 | 404 | 413 | 422 => LlmError::fatal(message),
            // Some gateways wrap quota errors in other codes
            _ => Self::classify(message),
        };
        err.with_status(status)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RegriskError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    /// Collaborator fetch failure; the input set would be incomplete
    #[error("{source_name} request failed: {message}")]
    Source {
        source_name: &'static str,
        message: String,
    },

    /// Batch-level precondition violated before any inference call
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, RegriskError>;

impl RegriskError {
    pub fn fetch_failed(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::Source {
            source_name,
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimited.to_string(), "RATE_LIMITED");
        assert_eq!(ErrorCategory::Fatal.to_string(), "FATAL");
        assert_eq!(ErrorCategory::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(ErrorCategory::RateLimited.is_retryable());
        assert!(!ErrorCategory::Fatal.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit_markers() {
        for msg in [
            "Rate limit exceeded, please retry",
            "RESOURCE_EXHAUSTED: Quota exceeded for metric",
            "HTTP 429",
            "Too Many Requests",
        ] {
            assert_eq!(
                ErrorClassifier::classify(msg).category,
                ErrorCategory::RateLimited,
                "{msg}"
            );
        }
    }

    #[test]
    fn test_token_counts_are_not_status_codes() {
        let err = ErrorClassifier::classify_http_status(500, "prompt has 14290 tokens");
        assert_eq!(err.category, ErrorCategory::Unknown);

        let err = ErrorClassifier::classify("upstream said 4290ms");
        assert_eq!(err.category, ErrorCategory::Unknown);

        let err = ErrorClassifier::classify("gateway error (429)");
        assert_eq!(err.category, ErrorCategory::RateLimited);
    }

    #[test]
    fn test_classify_fatal() {
        let err = ErrorClassifier::classify("API key not valid. Please pass a valid API key.");
        assert_eq!(err.category, ErrorCategory::Fatal);
        assert!(!err.category.is_retryable());
    }

    #[test]
    fn test_classify_unknown() {
        let err = ErrorClassifier::classify("Something weird happened");
        assert_eq!(err.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_classify_http_status() {
        let throttled = ErrorClassifier::classify_http_status(429, "slow down");
        assert_eq!(throttled.category, ErrorCategory::RateLimited);
        assert_eq!(throttled.status, Some(429));

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized");
        assert_eq!(auth.category, ErrorCategory::Fatal);

        // 503 carrying a quota payload is still throttling
        let wrapped = ErrorClassifier::classify_http_status(503, "quota exhausted");
        assert_eq!(wrapped.category, ErrorCategory::RateLimited);

        let server = ErrorClassifier::classify_http_status(500, "internal");
        assert_eq!(server.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::rate_limited("Too many requests").with_status(429);
        assert_eq!(err.to_string(), "[RATE_LIMITED:429] Too many requests");

        let plain = LlmError::fatal("bad model");
        assert_eq!(plain.to_string(), "[FATAL] bad model");
    }

    #[test]
    fn test_maybe_retry_after_keeps_existing_hint() {
        let err = LlmError::rate_limited("x")
            .retry_after(Duration::from_secs(3))
            .maybe_retry_after(None);
        assert_eq!(err.retry_after, Some(Duration::from_secs(3)));
    }
}
