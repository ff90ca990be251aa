//! Rate Window Tracker
//!
//! Local, advisory per-minute token throttle in front of the provider.
//!
//! The tracker only sees its own estimates: estimation error, clock skew and
//! other users of the same key are not modeled. When the provider throttles
//! anyway, the caller resets the window and trusts the provider from there.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::constants::throttle as throttle_constants;

/// Token accounting for the current window, one per run
#[derive(Debug, Clone)]
pub struct PromptBudgetState {
    pub window_start: Instant,
    pub tokens_in_window: u64,
}

impl PromptBudgetState {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            tokens_in_window: 0,
        }
    }

    fn restart(&mut self) {
        self.window_start = Instant::now();
        self.tokens_in_window = 0;
    }
}

impl Default for PromptBudgetState {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracker tuning
#[derive(Debug, Clone)]
pub struct RateWindowConfig {
    /// Tokens admitted per window
    pub ceiling: u64,
    /// Window length
    pub window: Duration,
    /// Extra wait after the window elapses
    pub buffer: Duration,
}

impl Default for RateWindowConfig {
    fn default() -> Self {
        Self {
            ceiling: throttle_constants::TOKENS_PER_MINUTE,
            window: Duration::from_millis(throttle_constants::WINDOW_MS),
            buffer: Duration::from_millis(throttle_constants::WINDOW_BUFFER_MS),
        }
    }
}

/// Gate that pauses the pipeline when the window's budget would be exceeded
#[derive(Debug)]
pub struct RateWindowTracker {
    config: RateWindowConfig,
    state: PromptBudgetState,
}

impl RateWindowTracker {
    pub fn new(config: RateWindowConfig) -> Self {
        Self {
            config,
            state: PromptBudgetState::new(),
        }
    }

    /// Tracker with the given per-minute ceiling and default window
    pub fn with_ceiling(ceiling: u64) -> Self {
        Self::new(RateWindowConfig {
            ceiling,
            ..Default::default()
        })
    }

    pub fn state(&self) -> &PromptBudgetState {
        &self.state
    }

    /// Wait, if needed, until `tokens` fit in the window, then account them.
    ///
    /// Returns how long the call slept.
    pub async fn admit(&mut self, tokens: u64) -> Duration {
        let elapsed = self.state.window_start.elapsed();
        if elapsed > self.config.window {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                consumed = self.state.tokens_in_window,
                "Token window rolled over"
            );
            self.state.restart();
        }

        let mut waited = Duration::ZERO;
        let projected = self.state.tokens_in_window.saturating_add(tokens);

        if projected > self.config.ceiling {
            if self.state.tokens_in_window == 0 {
                // Nothing to wait out: a lone oversized request gets a fresh window
                warn!(
                    tokens,
                    ceiling = self.config.ceiling,
                    "Request alone exceeds the per-minute token ceiling"
                );
            } else {
                let elapsed = self.state.window_start.elapsed();
                waited = self.config.window.saturating_sub(elapsed) + self.config.buffer;
                info!(
                    consumed = self.state.tokens_in_window,
                    requested = tokens,
                    ceiling = self.config.ceiling,
                    wait_ms = waited.as_millis() as u64,
                    "Token ceiling reached, waiting for the next window"
                );
                sleep(waited).await;
            }
            self.state.restart();
        }

        self.state.tokens_in_window += tokens;
        debug!(
            tokens,
            consumed = self.state.tokens_in_window,
            ceiling = self.config.ceiling,
            "Request admitted"
        );
        waited
    }

    /// Account `tokens` already sent in the current window, without waiting.
    ///
    /// Used after a retried call succeeds: the reset discarded the first
    /// attempt, but the prompt that went through still counts.
    pub fn charge(&mut self, tokens: u64) {
        self.state.tokens_in_window = self.state.tokens_in_window.saturating_add(tokens);
        debug!(
            tokens,
            consumed = self.state.tokens_in_window,
            "Retried request charged to window"
        );
    }

    /// Discard the local estimate after the provider reported throttling
    pub fn reset(&mut self) {
        debug!(
            consumed = self.state.tokens_in_window,
            "Resetting token window after provider rate limit"
        );
        self.state.restart();
    }
}

impl Default for RateWindowTracker {
    fn default() -> Self {
        Self::new(RateWindowConfig::default())
    }
}
