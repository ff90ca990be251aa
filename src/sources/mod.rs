//! Evidence Sources
//!
//! Read-only collaborators that gather the input for a run:
//! pull-request metadata, per-file commit history, and ticket descriptions.
//!
//! History is fetched with bounded concurrency and fully materialized before
//! any inference starts; the inference stage itself stays sequential.

pub mod github;
pub mod jira;
pub mod tickets;

pub use github::GitHubSource;
pub use jira::JiraTracker;
pub use tickets::extract_ticket_ids;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::types::{
    ChangeEntry, ChangedFile, HistoricalChange, PullRequestInfo, RegriskError, Result,
};

/// Source host holding the pull request and its repository history
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Pull-request metadata
    async fn pull_request(&self, number: u64) -> Result<PullRequestInfo>;

    /// Changed files worth analyzing, in host order
    async fn changed_files(&self, number: u64) -> Result<Vec<ChangedFile>>;

    /// Prior commits touching `path` up to `base`, with file-scoped diffs
    async fn file_history(&self, path: &str, base: &str) -> Result<Vec<HistoricalChange>>;
}

/// Issue tracker resolving ticket ids to description text
#[async_trait]
pub trait TicketTracker: Send + Sync {
    /// Descriptions keyed by ticket id; an empty set resolves without I/O
    async fn describe(&self, ids: &BTreeSet<String>) -> Result<BTreeMap<String, String>>;
}

/// Build one [`ChangeEntry`] per changed file, fetching histories concurrently.
///
/// Output order matches `files`. The first fetch failure aborts the whole
/// gather, since a partial input set must not be analyzed.
pub async fn gather_entries(
    source: &dyn PullRequestSource,
    pr: &PullRequestInfo,
    files: &[ChangedFile],
    concurrency: usize,
) -> Result<Vec<ChangeEntry>> {
    if files.is_empty() {
        return Err(RegriskError::precondition(format!(
            "PR #{} has no changed files left to analyze after filtering",
            pr.number
        )));
    }

    info!(files = files.len(), concurrency, "Fetching file histories");

    let entries: Vec<ChangeEntry> = stream::iter(files)
        .map(|file| async move {
            let history = source.file_history(&file.path, &pr.base_revision).await?;
            debug!(path = %file.path, commits = history.len(), "History fetched");
            Ok::<_, RegriskError>(ChangeEntry::new(
                file.path.clone(),
                file.patch.clone(),
                history,
            ))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(entries)
}

/// Every ticket id referenced by the PR or any entry's history
pub fn collect_ticket_ids(pr: &PullRequestInfo, entries: &[ChangeEntry]) -> BTreeSet<String> {
    let mut ids = pr.ticket_ids.clone();
    for entry in entries {
        ids.extend(entry.ticket_ids());
    }
    ids
}
