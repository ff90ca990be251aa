//! GitHub source (REST v3) for PR metadata, changed files and file history.
//!
//! Endpoints used:
//!   * GET /repos/{owner}/{repo}/pulls/{number}
//!   * GET /repos/{owner}/{repo}/pulls/{number}/files
//!   * GET /repos/{owner}/{repo}/commits?path={path}&sha={base}
//!   * GET /repos/{owner}/{repo}/commits/{sha}

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::PullRequestSource;
use super::tickets::extract_ticket_ids;
use crate::config::FetchConfig;
use crate::constants::fetch::{MERGE_PREFIXES, PER_PAGE};
use crate::constants::network::USER_AGENT;
use crate::types::{ChangedFile, HistoricalChange, PullRequestInfo, RegriskError, Result};

const SOURCE_NAME: &str = "GitHub";

/// GitHub HTTP client bound to one repository
pub struct GitHubSource {
    http: Client,
    base_api: String,
    owner: String,
    repo: String,
    token: Option<SecretString>,
    filter: FileFilter,
    max_history_commits: Option<usize>,
}

impl std::fmt::Debug for GitHubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSource")
            .field("base_api", &self.base_api)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("max_history_commits", &self.max_history_commits)
            .finish()
    }
}

impl GitHubSource {
    /// `repository` is `owner/name`; an absent token limits calls to public repos
    pub fn new(repository: &str, token: Option<SecretString>, config: &FetchConfig) -> Result<Self> {
        let (owner, repo) = split_owner_repo(repository)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RegriskError::Config(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Creating GitHubSource for {}/{}", owner, repo);

        Ok(Self {
            http,
            base_api: config.github_api.trim_end_matches('/').to_string(),
            owner,
            repo,
            token,
            filter: FileFilter::new(&config.exclude_patterns)?,
            max_history_commits: config.max_history_commits,
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_api, self.owner, self.repo, tail)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GitHub GET {}", url);

        let mut request = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let fetch_failed = |e: reqwest::Error| RegriskError::fetch_failed(SOURCE_NAME, e.to_string());

        request
            .send()
            .await
            .map_err(fetch_failed)?
            .error_for_status()
            .map_err(fetch_failed)?
            .json()
            .await
            .map_err(fetch_failed)
    }

    /// Commit list for `path` reachable from `base`, newest first, merges dropped
    async fn list_commits(&self, path: &str, base: &str) -> Result<Vec<GhCommitSummary>> {
        let url = &self.repo_url("commits");
        let commits: Vec<GhCommitSummary> =
            collect_pages(PER_PAGE, self.max_history_commits, |page| {
                let query = vec![
                    ("path", path.to_string()),
                    ("sha", base.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ];
                async move { self.get_json(url, &query).await }
            })
            .await?;

        let total = commits.len();
        let kept: Vec<GhCommitSummary> = commits
            .into_iter()
            .filter(|c| !is_merge_noise(&c.commit.message))
            .collect();
        debug!(path, listed = total, kept = kept.len(), "Commit history listed");
        Ok(kept)
    }
}

#[async_trait]
impl PullRequestSource for GitHubSource {
    async fn pull_request(&self, number: u64) -> Result<PullRequestInfo> {
        let pr: GhPullRequest = self
            .get_json(&self.repo_url(&format!("pulls/{}", number)), &[])
            .await?;
        Ok(pr.into_info())
    }

    async fn changed_files(&self, number: u64) -> Result<Vec<ChangedFile>> {
        let url = &self.repo_url(&format!("pulls/{}/files", number));
        let files: Vec<GhPrFile> = collect_pages(PER_PAGE, None, |page| {
            let query = vec![
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            async move { self.get_json(url, &query).await }
        })
        .await?;

        let total = files.len();
        let kept: Vec<ChangedFile> = files
            .into_iter()
            .map(|f| ChangedFile {
                path: f.filename,
                status: f.status,
                patch: f.patch,
            })
            .filter(|f| self.filter.should_analyze(f))
            .collect();

        info!(
            pr = number,
            total,
            kept = kept.len(),
            "Changed files listed"
        );
        Ok(kept)
    }

    async fn file_history(&self, path: &str, base: &str) -> Result<Vec<HistoricalChange>> {
        let commits = self.list_commits(path, base).await?;
        let mut history = Vec::with_capacity(commits.len());

        for summary in commits {
            let detail: GhCommitDetail = self
                .get_json(&self.repo_url(&format!("commits/{}", summary.sha)), &[])
                .await?;
            let diff = detail.patch_for(path).unwrap_or_default();
            let message = summary.commit.message;

            history.push(HistoricalChange::new(
                extract_ticket_ids(&message),
                message,
                &summary.sha,
                diff,
            ));
        }

        Ok(history)
    }
}

/// Follow 1-based pages until one comes back short.
///
/// `limit` stops paging once that many items are collected; `None` reads everything.
async fn collect_pages<T, F, Fut>(
    per_page: usize,
    limit: Option<usize>,
    mut fetch_page: F,
) -> Result<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let batch = fetch_page(page).await?;
        let short_page = batch.len() < per_page;
        items.extend(batch);

        if let Some(limit) = limit
            && items.len() >= limit
        {
            items.truncate(limit);
            break;
        }
        if short_page {
            break;
        }
        page += 1;
    }

    Ok(items)
}

// =============================================================================
// Filtering
// =============================================================================

/// Decides which changed files are worth analyzing
#[derive(Debug)]
pub struct FileFilter {
    excludes: Vec<Regex>,
}

impl FileFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let excludes = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    RegriskError::Config(format!("Invalid exclude pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { excludes })
    }

    /// New files have no history; excluded paths are generated, migrations or tests
    pub fn should_analyze(&self, file: &ChangedFile) -> bool {
        if file.status == "added" {
            return false;
        }
        !self.excludes.iter().any(|re| re.is_match(&file.path))
    }
}

/// Merge commits repeat changes already present in their parents
pub fn is_merge_noise(message: &str) -> bool {
    MERGE_PREFIXES
        .iter()
        .any(|prefix| message.trim_start().starts_with(prefix))
}

fn split_owner_repo(repository: &str) -> Result<(String, String)> {
    match repository.trim().split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(RegriskError::Config(format!(
            "Repository must be given as owner/name, got '{}'",
            repository
        ))),
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    base: GhRef,
    head: GhRef,
}

impl GhPullRequest {
    fn into_info(self) -> PullRequestInfo {
        let mut ticket_ids = extract_ticket_ids(&self.title);
        if let Some(body) = &self.body {
            ticket_ids.extend(extract_ticket_ids(body));
        }
        PullRequestInfo {
            number: self.number,
            title: self.title,
            body: self.body,
            base_revision: self.base.sha,
            head_revision: self.head.sha,
            ticket_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhPrFile {
    filename: String,
    status: String,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhCommitSummary {
    sha: String,
    commit: GhCommitInner,
}

#[derive(Debug, Deserialize)]
struct GhCommitInner {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GhCommitDetail {
    #[serde(default)]
    files: Vec<GhCommitFile>,
}

#[derive(Debug, Deserialize)]
struct GhCommitFile {
    filename: String,
    previous_filename: Option<String>,
    patch: Option<String>,
}

impl GhCommitDetail {
    /// Patch for `path`, following a rename recorded in this commit
    fn patch_for(self, path: &str) -> Option<String> {
        self.files
            .into_iter()
            .find(|f| f.filename == path || f.previous_filename.as_deref() == Some(path))
            .and_then(|f| f.patch)
    }
}
