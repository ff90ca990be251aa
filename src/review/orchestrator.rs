//! Batch Orchestrator
//!
//! Runs the regression analysis for every entry, one at a time, in input order.
//!
//! Per entry:
//! 1. Assemble the prompt and estimate its tokens
//! 2. Wait at the rate window gate
//! 3. Call the provider through the retry driver
//! 4. Record the outcome (success or classified failure) and move on
//!
//! Dispatch is never concurrent: every call draws from the same per-minute
//! budget, and the window accounting assumes one caller.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::report::{AnalysisOutcome, BatchReport, OutcomeSink};
use crate::ai::prompt::{PromptOptions, regression_prompt};
use crate::ai::provider::SharedProvider;
use crate::ai::rate_window::{RateWindowConfig, RateWindowTracker};
use crate::ai::retry::{RetryDriver, RetryPolicy};
use crate::ai::tokenizer::TokenCounter;
use crate::config::Config;
use crate::constants::{throttle, tokens};
use crate::types::{ChangeEntry, RegriskError, Result};

/// Orchestrator tuning, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub retry: RetryPolicy,
    pub rate_window: RateWindowConfig,
    pub chars_per_token: usize,
    pub prompt: PromptOptions,
    pub large_prompt_threshold: u64,
    pub inter_request_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rate_window: RateWindowConfig::default(),
            chars_per_token: tokens::CHARS_PER_TOKEN,
            prompt: PromptOptions::default(),
            large_prompt_threshold: tokens::LARGE_PROMPT_THRESHOLD,
            inter_request_delay: Duration::from_millis(throttle::INTER_REQUEST_DELAY_MS),
        }
    }
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.throttle.retry_policy(),
            rate_window: config.throttle.rate_window(),
            chars_per_token: config.prompt.chars_per_token,
            prompt: config.prompt.options(),
            large_prompt_threshold: config.prompt.large_prompt_threshold,
            inter_request_delay: config.throttle.inter_request_delay(),
        }
    }
}

/// Sequential, rate-limited driver for one batch of entries
pub struct BatchOrchestrator {
    provider: SharedProvider,
    driver: RetryDriver,
    tracker: RateWindowTracker,
    counter: TokenCounter,
    prompt: PromptOptions,
    large_prompt_threshold: u64,
    inter_request_delay: Duration,
    tickets: BTreeMap<String, String>,
}

impl BatchOrchestrator {
    pub fn new(provider: SharedProvider, settings: BatchSettings) -> Self {
        Self {
            provider,
            driver: RetryDriver::new(settings.retry),
            tracker: RateWindowTracker::new(settings.rate_window),
            counter: TokenCounter::with_ratio(settings.chars_per_token),
            prompt: settings.prompt,
            large_prompt_threshold: settings.large_prompt_threshold,
            inter_request_delay: settings.inter_request_delay,
            tickets: BTreeMap::new(),
        }
    }

    /// Resolved ticket descriptions embedded into prompts
    pub fn with_tickets(mut self, tickets: BTreeMap<String, String>) -> Self {
        self.tickets = tickets;
        self
    }

    pub fn tracker(&self) -> &RateWindowTracker {
        &self.tracker
    }

    /// Analyze every entry; individual failures are recorded, never raised.
    ///
    /// Fails only when there is nothing to analyze, before any provider call.
    #[instrument(skip_all, fields(entries = entries.len(), provider = self.provider.name()))]
    pub async fn run(
        &mut self,
        entries: &[ChangeEntry],
        sink: &mut dyn OutcomeSink,
    ) -> Result<BatchReport> {
        if entries.is_empty() {
            return Err(RegriskError::precondition(
                "no change entries to analyze; refusing to run an empty batch",
            ));
        }

        let total = entries.len();
        info!(
            total,
            model = self.provider.model(),
            "Starting regression analysis"
        );

        let mut outcomes = Vec::with_capacity(total);
        for (idx, entry) in entries.iter().enumerate() {
            info!("[{}/{}] Analyzing {}", idx + 1, total, entry.path());

            let outcome = self.analyze(entry).await;
            sink.record(&outcome);
            outcomes.push(outcome);

            if idx + 1 < total && !self.inter_request_delay.is_zero() {
                debug!(
                    delay_ms = self.inter_request_delay.as_millis() as u64,
                    "Pausing before next entry"
                );
                sleep(self.inter_request_delay).await;
            }
        }

        let report = BatchReport::new(outcomes);
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            retries = report.total_retries(),
            "Analysis {}",
            report.summary()
        );
        Ok(report)
    }

    async fn analyze(&mut self, entry: &ChangeEntry) -> AnalysisOutcome {
        let prompt = regression_prompt(entry, &self.tickets, &self.prompt);
        let tokens = self.counter.count(&prompt);

        if tokens > self.large_prompt_threshold {
            warn!(
                path = entry.path(),
                tokens,
                threshold = self.large_prompt_threshold,
                "Large prompt; the provider may reject or throttle it"
            );
        }

        let waited = self.tracker.admit(tokens).await;
        debug!(
            path = entry.path(),
            tokens,
            waited_ms = waited.as_millis() as u64,
            "Prompt admitted"
        );

        let provider = &self.provider;
        let tracker = &mut self.tracker;
        let prompt = prompt.as_str();
        let result = self
            .driver
            .execute_observed(
                entry.path(),
                || provider.generate(prompt),
                |_| tracker.reset(),
            )
            .await;

        match result {
            Ok(outcome) => {
                if outcome.retries > 0 {
                    self.tracker.charge(tokens);
                }
                info!(path = entry.path(), retries = outcome.retries, "Analysis complete");
                AnalysisOutcome::Analyzed {
                    path: entry.path().to_string(),
                    response: outcome.value,
                    retries: outcome.retries,
                }
            }
            Err(err) => {
                let category = err.last_error().category;
                error!(
                    path = entry.path(),
                    %category,
                    error = %err,
                    "Analysis failed; continuing with next entry"
                );
                AnalysisOutcome::Failed {
                    path: entry.path().to_string(),
                    category,
                    message: err.to_string(),
                    remediation: category.remediation(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::LlmProvider;
    use crate::types::{ErrorCategory, HistoricalChange, LlmError};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    type Behavior = dyn Fn(&str, u32) -> std::result::Result<String, LlmError> + Send + Sync;

    /// Answers by file path; `calls` counts every invocation
    struct StubProvider {
        calls: AtomicU32,
        behavior: Box<Behavior>,
    }

    impl StubProvider {
        fn new(
            behavior: impl Fn(&str, u32) -> std::result::Result<String, LlmError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                behavior: Box::new(behavior),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let path = prompt
                .lines()
                .find_map(|l| l.strip_prefix("**File**: "))
                .unwrap_or("?");
            (self.behavior)(path, call)
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }
    }

    fn ok_by_path(path: &str, _call: u32) -> std::result::Result<String, LlmError> {
        Ok(format!("OK:{}", path))
    }

    fn settings() -> BatchSettings {
        BatchSettings {
            inter_request_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn entries(paths: &[&str]) -> Vec<ChangeEntry> {
        paths
            .iter()
            .map(|p| ChangeEntry::new(*p, Some(format!("+{}", p)), Vec::new()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_two_files() {
        let provider = StubProvider::new(ok_by_path);
        let input = vec![
            ChangeEntry::new("a.ts", Some("+x".to_string()), Vec::new()),
            ChangeEntry::new(
                "b.ts",
                Some("+y".to_string()),
                vec![HistoricalChange::new(
                    BTreeSet::from(["T-1".to_string()]),
                    "fix",
                    "abcdef1234567890",
                    "-old+new",
                )],
            ),
        ];

        let mut sink: Vec<AnalysisOutcome> = Vec::new();
        let report = BatchOrchestrator::new(provider.clone(), settings())
            .run(&input, &mut sink)
            .await
            .unwrap();

        let responses: Vec<_> = report.outcomes().iter().filter_map(|o| o.response()).collect();
        assert_eq!(responses, vec!["OK:a.ts", "OK:b.ts"]);
        assert_eq!(report.total_retries(), 0);
        assert_eq!(provider.calls(), 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].path(), "a.ts");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_entry_does_not_abort_batch() {
        let provider = StubProvider::new(|path, _| {
            if path == "two.ts" {
                Err(LlmError::fatal("invalid argument").with_status(400))
            } else {
                Ok(format!("OK:{}", path))
            }
        });

        let mut sink: Vec<AnalysisOutcome> = Vec::new();
        let report = BatchOrchestrator::new(provider.clone(), settings())
            .run(&entries(&["one.ts", "two.ts", "three.ts"]), &mut sink)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.outcomes()[0].response(), Some("OK:one.ts"));
        assert_eq!(report.outcomes()[2].response(), Some("OK:three.ts"));
        match &report.outcomes()[1] {
            AnalysisOutcome::Failed {
                path,
                category,
                remediation,
                ..
            } => {
                assert_eq!(path, "two.ts");
                assert_eq!(*category, ErrorCategory::Fatal);
                assert_eq!(*remediation, ErrorCategory::Fatal.remediation());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            report.summary(),
            "completed with 2/3 items successfully analyzed"
        );
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected_before_any_call() {
        let provider = StubProvider::new(ok_by_path);
        let mut sink: Vec<AnalysisOutcome> = Vec::new();

        let err = BatchOrchestrator::new(provider.clone(), settings())
            .run(&[], &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, RegriskError::Precondition(_)));
        assert_eq!(provider.calls(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_request_delay_skipped_after_last_entry() {
        let provider = StubProvider::new(ok_by_path);
        let settings = BatchSettings {
            inter_request_delay: Duration::from_secs(2),
            ..Default::default()
        };

        let start = Instant::now();
        BatchOrchestrator::new(provider, settings)
            .run(&entries(&["a.ts", "b.ts", "c.ts"]), &mut Vec::<AnalysisOutcome>::new())
            .await
            .unwrap();

        // two gaps between three entries
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_recovers_and_recounts_prompt() {
        let provider = StubProvider::new(|path, call| {
            if call == 0 {
                Err(LlmError::rate_limited("RESOURCE_EXHAUSTED")
                    .with_status(429)
                    .retry_after(Duration::from_secs(3)))
            } else {
                Ok(format!("OK:{}", path))
            }
        });

        let mut orchestrator = BatchOrchestrator::new(provider.clone(), settings());
        let start = Instant::now();
        let report = orchestrator
            .run(&entries(&["a.ts"]), &mut Vec::<AnalysisOutcome>::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes()[0].response(), Some("OK:a.ts"));
        assert_eq!(report.total_retries(), 1);
        assert_eq!(provider.calls(), 2);
        // 3s hint plus the 1s safety buffer
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        // throttled attempt discarded, the prompt that went through still counts
        let sent = TokenCounter::default().count(&regression_prompt(
            &entries(&["a.ts"])[0],
            &BTreeMap::new(),
            &PromptOptions::default(),
        ));
        assert!(sent > 0);
        assert_eq!(orchestrator.tracker().state().tokens_in_window, sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_prompt_gates_next_entry() {
        let provider = StubProvider::new(|path, call| {
            if call == 0 {
                Err(LlmError::rate_limited("quota").retry_after(Duration::from_secs(3)))
            } else {
                Ok(format!("OK:{}", path))
            }
        });
        let prompt_tokens = TokenCounter::default().count(&regression_prompt(
            &entries(&["a.ts"])[0],
            &BTreeMap::new(),
            &PromptOptions::default(),
        ));
        let mut settings = settings();
        // room for one prompt per window
        settings.rate_window.ceiling = prompt_tokens + 1;

        let mut orchestrator = BatchOrchestrator::new(provider.clone(), settings);
        let start = Instant::now();
        let report = orchestrator
            .run(&entries(&["a.ts", "b.ts"]), &mut Vec::<AnalysisOutcome>::new())
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(provider.calls(), 3);
        // 4s retry wait, then b.ts waits out the window restarted at the throttle
        assert_eq!(start.elapsed(), Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_recorded_as_rate_limited() {
        let provider = StubProvider::new(|_, _| Err(LlmError::rate_limited("quota exceeded")));
        let settings = BatchSettings {
            retry: RetryPolicy {
                max_retries: 2,
                ..Default::default()
            },
            ..settings()
        };

        let report = BatchOrchestrator::new(provider.clone(), settings)
            .run(&entries(&["a.ts", "b.ts"]), &mut Vec::<AnalysisOutcome>::new())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 6);
        assert_eq!(report.succeeded(), 0);
        for outcome in report.outcomes() {
            match outcome {
                AnalysisOutcome::Failed {
                    category, message, ..
                } => {
                    assert_eq!(*category, ErrorCategory::RateLimited);
                    assert!(message.contains("after 3 attempts"), "{message}");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_gate_pauses_between_entries() {
        let provider = StubProvider::new(ok_by_path);
        let settings = BatchSettings {
            rate_window: RateWindowConfig {
                ceiling: 1,
                ..Default::default()
            },
            ..settings()
        };

        let start = Instant::now();
        let report = BatchOrchestrator::new(provider, settings)
            .run(&entries(&["a.ts", "b.ts"]), &mut Vec::<AnalysisOutcome>::new())
            .await
            .unwrap();

        // first prompt opens a fresh window; the second waits it out plus the buffer
        assert_eq!(report.succeeded(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(61));
    }
}
