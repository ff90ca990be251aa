//! Analyze Command
//!
//! Gathers evidence for a pull request and runs the regression analysis.
//!
//! Usage:
//!   regrisk analyze --repo owner/name --pr 42 [--provider gemini] [--model m]
//!                   [--output report.md] [--dry-run] [--no-tickets]

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::SecretString;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::ai::prompt::regression_prompt;
use crate::ai::provider::create_provider;
use crate::ai::tokenizer::TokenCounter;
use crate::cli::ui::Output;
use crate::cli::ui::markdown::{render_outcome, render_report};
use crate::config::{Config, ConfigLoader};
use crate::review::{AnalysisOutcome, BatchOrchestrator, BatchSettings, OutcomeSink};
use crate::sources::{
    GitHubSource, JiraTracker, PullRequestSource, TicketTracker, collect_ticket_ids,
    gather_entries,
};
use crate::storage::{EvidenceSnapshot, persist_or_print};
use crate::types::{ChangeEntry, RegriskError, Result};

/// Options for the analyze command
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Repository as `owner/name`
    pub repo: String,
    pub pr: u64,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Markdown report destination
    pub output: Option<PathBuf>,
    /// Gather evidence and estimate prompts without calling the provider
    pub dry_run: bool,
    pub no_tickets: bool,
}

pub fn run(options: AnalyzeOptions) -> Result<()> {
    let config = load_config(&options)?;
    let rt = Runtime::new()?;
    rt.block_on(run_async(options, config))
}

fn load_config(options: &AnalyzeOptions) -> Result<Config> {
    let mut config = ConfigLoader::load()?;

    if let Some(provider) = &options.provider {
        config.llm.provider = provider.clone();
    }
    if let Some(model) = &options.model {
        config.llm.model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_async(options: AnalyzeOptions, config: Config) -> Result<()> {
    let output = Output::new();

    // Credentials are checked up front so a misconfigured run fails before any fetch
    let provider = if options.dry_run {
        None
    } else {
        Some(create_provider(&config.llm)?)
    };

    let github_token = secret_env("GITHUB_TOKEN");
    if github_token.is_none() {
        output.warning("GITHUB_TOKEN not set; using unauthenticated GitHub requests");
    }

    let source = GitHubSource::new(&options.repo, github_token, &config.fetch)?;

    output.header(&format!("Pull request {}#{}", options.repo, options.pr));
    let pr = source.pull_request(options.pr).await?;
    output.detail("Title", &pr.title);
    output.detail("Base", crate::types::short_revision(&pr.base_revision));

    let files = source.changed_files(options.pr).await?;
    output.detail("Files to analyze", files.len());

    let entries = gather_entries(&source, &pr, &files, config.fetch.history_concurrency).await?;
    let history_commits: usize = entries.iter().map(|e| e.past_changes().len()).sum();
    output.detail("Historical commits", history_commits);

    let tickets = if options.no_tickets {
        info!("Ticket lookup disabled");
        BTreeMap::new()
    } else {
        resolve_tickets(&config, &pr, &entries, &output).await?
    };

    let snapshot = EvidenceSnapshot::new(&options.repo, &pr, &entries, tickets.clone());
    if let Some(path) = persist_or_print(&config.output.snapshot_dir, &snapshot) {
        output.success(&format!("Evidence snapshot: {}", path.display()));
    }

    let Some(provider) = provider else {
        print_dry_run(&config, &entries, &tickets, &output);
        return Ok(());
    };

    output.section(&format!(
        "Analyzing {} files with {} ({})",
        entries.len(),
        provider.name(),
        provider.model()
    ));

    let mut orchestrator =
        BatchOrchestrator::new(provider, BatchSettings::from_config(&config)).with_tickets(tickets);
    let mut sink = ConsoleSink::new(&output);
    let report = orchestrator.run(&entries, &mut sink).await?;

    if let Some(path) = &options.output {
        std::fs::write(path, render_report(&options.repo, &pr, &report))?;
        output.success(&format!("Report written to {}", path.display()));
    }

    let summary = format!("Analysis {}", report.summary());
    if report.failed() == 0 {
        output.success(&summary);
    } else {
        output.warning(&summary);
    }
    if report.total_retries() > 0 {
        output.detail("Retries", report.total_retries());
    }

    Ok(())
}

async fn resolve_tickets(
    config: &Config,
    pr: &crate::types::PullRequestInfo,
    entries: &[ChangeEntry],
    output: &Output,
) -> Result<BTreeMap<String, String>> {
    let ids = collect_ticket_ids(pr, entries);
    if ids.is_empty() {
        debug!("No ticket ids referenced");
        return Ok(BTreeMap::new());
    }

    let Some(base_url) = config.tracker.jira_base_url.as_deref() else {
        output.info(&format!(
            "{} ticket ids referenced; set tracker.jira_base_url to include descriptions",
            ids.len()
        ));
        return Ok(BTreeMap::new());
    };

    let email = std::env::var("JIRA_EMAIL").ok().filter(|v| !v.trim().is_empty());
    let (Some(email), Some(token)) = (email, secret_env("JIRA_API_TOKEN")) else {
        return Err(RegriskError::Config(
            "tracker.jira_base_url is set but JIRA_EMAIL or JIRA_API_TOKEN is missing".to_string(),
        ));
    };

    let tracker = JiraTracker::new(base_url, email, token, config.fetch.timeout_secs)?;
    let tickets = tracker.describe(&ids).await?;
    output.detail("Tickets resolved", format!("{}/{}", tickets.len(), ids.len()));
    Ok(tickets)
}

fn print_dry_run(
    config: &Config,
    entries: &[ChangeEntry],
    tickets: &BTreeMap<String, String>,
    output: &Output,
) {
    let counter = TokenCounter::with_ratio(config.prompt.chars_per_token);
    let options = config.prompt.options();

    output.section("Dry run: estimated prompt sizes");
    let mut total = 0u64;
    for entry in entries {
        let tokens = counter.count(&regression_prompt(entry, tickets, &options));
        total += tokens;
        output.detail(entry.path(), format!("~{} tokens", tokens));
    }

    let minutes = total.div_ceil(config.throttle.tokens_per_minute.max(1));
    output.info(&format!(
        "~{} tokens in total; at least {} rate window(s) of {} tokens",
        total, minutes, config.throttle.tokens_per_minute
    ));
}

fn secret_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

/// Prints each outcome as soon as it is recorded
struct ConsoleSink<'a> {
    output: &'a Output,
}

impl<'a> ConsoleSink<'a> {
    fn new(output: &'a Output) -> Self {
        Self { output }
    }
}

impl OutcomeSink for ConsoleSink<'_> {
    fn record(&mut self, outcome: &AnalysisOutcome) {
        match outcome {
            AnalysisOutcome::Analyzed { path, retries, .. } => {
                if *retries > 0 {
                    self.output
                        .success(&format!("{} (after {} retries)", path, retries));
                } else {
                    self.output.success(path);
                }
                println!("\n{}", render_outcome(outcome));
            }
            AnalysisOutcome::Failed {
                path,
                category,
                message,
                remediation,
            } => {
                self.output
                    .error(&format!("{} [{}]: {}", path, category, message));
                self.output.hint(remediation);
            }
        }
    }
}
