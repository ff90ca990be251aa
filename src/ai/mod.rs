//! AI Integration Layer
//!
//! Everything between an assembled prompt and the provider's answer:
//! token estimation, the per-minute token window, retry with backoff,
//! and the providers themselves.

pub mod backoff;
pub mod prompt;
pub mod provider;
pub mod rate_window;
pub mod retry;
pub mod tokenizer;

pub use backoff::BackoffConfig;
pub use prompt::{PromptBuilder, PromptOptions, PromptSection, regression_prompt};
pub use provider::{
    GeminiProvider, LlmProvider, OpenAiProvider, SharedProvider, create_provider,
};
pub use rate_window::{PromptBudgetState, RateWindowConfig, RateWindowTracker};
pub use retry::{RetryDriver, RetryError, RetryOutcome, RetryPolicy};
pub use tokenizer::{TokenCounter, estimate_tokens};
