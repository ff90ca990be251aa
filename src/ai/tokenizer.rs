//! Token Estimation
//!
//! Approximate token counts for prompts before they are sent.
//!
//! ## Strategy
//! - Fixed characters-per-token ratio, rounded up
//! - Over-estimating is acceptable; under-estimating risks real throttling

use crate::constants::tokens::CHARS_PER_TOKEN;

/// Character-ratio token counter
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    chars_per_token: usize,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::with_ratio(CHARS_PER_TOKEN)
    }
}

impl TokenCounter {
    /// A ratio of zero is treated as one character per token
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    /// `ceil(chars / ratio)`; zero only for empty text
    pub fn count(&self, text: &str) -> u64 {
        text.chars().count().div_ceil(self.chars_per_token) as u64
    }
}

/// Estimate tokens with the default ratio
pub fn estimate_tokens(text: &str) -> u64 {
    TokenCounter::default().count(text)
}
