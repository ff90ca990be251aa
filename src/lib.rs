//! regrisk - Pull-Request Regression Risk Analyzer
//!
//! Collects the history of every file a pull request touches, links the
//! tickets behind earlier changes, and asks an LLM where the new change may
//! re-break something an earlier commit fixed.
//!
//! ## Core Features
//!
//! - **Rate-Limited Batch Inference**: per-minute token window, sequential dispatch
//! - **Retry Driver**: provider retry hints first, jittered exponential backoff otherwise
//! - **Per-Item Isolation**: one failing file never aborts the batch
//! - **Evidence Snapshot**: the gathered context is persisted before analysis
//!
//! ## Quick Start
//!
//! ```ignore
//! use regrisk::{BatchOrchestrator, BatchSettings, Config, create_provider};
//!
//! let config = Config::default();
//! let provider = create_provider(&config.llm)?;
//! let mut orchestrator = BatchOrchestrator::new(provider, BatchSettings::from_config(&config));
//! let mut outcomes = Vec::new();
//! let report = orchestrator.run(&entries, &mut outcomes).await?;
//! println!("{}", report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: providers, token estimation, rate window, retry driver, prompts
//! - [`review`]: batch orchestrator and outcome reporting
//! - [`sources`]: GitHub history and Jira ticket collaborators
//! - [`storage`]: evidence snapshot persistence
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod review;
pub mod sources;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};
pub use types::{
    ChangeEntry, ChangedFile, ErrorCategory, HistoricalChange, LlmError, PullRequestInfo,
    RegriskError, Result,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use ai::{
    LlmProvider, RateWindowTracker, RetryDriver, RetryPolicy, SharedProvider, TokenCounter,
    create_provider, estimate_tokens,
};
pub use review::{AnalysisOutcome, BatchOrchestrator, BatchReport, BatchSettings, OutcomeSink};
pub use sources::{GitHubSource, JiraTracker, PullRequestSource, TicketTracker};
pub use storage::{EvidenceSnapshot, write_snapshot};
