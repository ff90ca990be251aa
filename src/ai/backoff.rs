//! Backoff Calculator
//!
//! Exponential delay with symmetric random jitter, clamped to a floor.
//! Jitter keeps callers that were throttled together from retrying in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::constants::retry as retry_constants;

/// Backoff tuning
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay for attempt 0 before jitter
    pub base_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    /// No computed delay goes below this
    pub floor: Duration,
    /// Jitter amplitude as a fraction of the exponential delay
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(retry_constants::BASE_DELAY_MS),
            max_delay: Duration::from_millis(retry_constants::MAX_DELAY_MS),
            floor: Duration::from_millis(retry_constants::MIN_DELAY_MS),
            jitter_ratio: retry_constants::JITTER_RATIO,
        }
    }
}

impl BackoffConfig {
    /// Jitter-free delay: `min(base * 2^attempt, max)`
    pub fn expected_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let exp_ms = base_ms.saturating_mul(factor);
        Duration::from_millis(exp_ms).min(self.max_delay)
    }

    /// Jittered delay for `attempt`, using the thread-local RNG
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::rng())
    }

    /// Jittered delay for `attempt` with a caller-supplied RNG
    pub fn delay_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exp_ms = self.expected_delay(attempt).as_millis() as f64;
        let spread = rng.random_range(-1.0..=1.0);
        let jittered = exp_ms + exp_ms * self.jitter_ratio * spread;
        let floor_ms = self.floor.as_millis() as f64;
        Duration::from_millis(jittered.max(floor_ms).round() as u64)
    }
}
