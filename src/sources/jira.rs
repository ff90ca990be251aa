//! Jira ticket tracker
//!
//! Resolves ticket ids to plain-text descriptions through the REST v2 API,
//! authenticating with an account email and API token.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::TicketTracker;
use crate::constants::network::USER_AGENT;
use crate::types::{RegriskError, Result};

const SOURCE_NAME: &str = "Jira";

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|pre)>").expect("BLOCK_BREAK regex should compile")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("TAG regex should compile"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("BLANK_LINES regex should compile"));

/// Jira REST client
pub struct JiraTracker {
    http: Client,
    base_url: String,
    email: String,
    api_token: SecretString,
}

impl std::fmt::Debug for JiraTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraTracker")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

impl JiraTracker {
    pub fn new(
        base_url: &str,
        email: String,
        api_token: SecretString,
        timeout_secs: u64,
    ) -> Result<Self> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| RegriskError::Config(format!("Invalid Jira URL '{}': {}", base_url, e)))?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RegriskError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            email,
            api_token,
        })
    }

    /// Fetch one issue; `None` when the id does not exist
    async fn fetch_issue(&self, id: &str) -> Result<Option<String>> {
        let url = format!("{}/rest/api/2/issue/{}", self.base_url, id);
        debug!("Jira GET {}", url);

        let fetch_failed = |e: reqwest::Error| RegriskError::fetch_failed(SOURCE_NAME, e.to_string());

        let response = self
            .http
            .get(&url)
            .query(&[
                ("fields", "summary,description"),
                ("expand", "renderedFields"),
            ])
            .basic_auth(&self.email, Some(self.api_token.expose_secret()))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(fetch_failed)?;

        // Commit messages can mention ids that only look like tickets
        if response.status() == StatusCode::NOT_FOUND {
            warn!(ticket = id, "Ticket not found, skipping");
            return Ok(None);
        }

        let issue: JiraIssue = response
            .error_for_status()
            .map_err(fetch_failed)?
            .json()
            .await
            .map_err(fetch_failed)?;

        Ok(Some(issue.describe()))
    }
}

#[async_trait]
impl TicketTracker for JiraTracker {
    async fn describe(&self, ids: &BTreeSet<String>) -> Result<BTreeMap<String, String>> {
        let mut descriptions = BTreeMap::new();
        if ids.is_empty() {
            return Ok(descriptions);
        }

        for id in ids {
            if let Some(text) = self.fetch_issue(id).await? {
                descriptions.insert(id.clone(), text);
            }
        }

        info!(
            requested = ids.len(),
            resolved = descriptions.len(),
            "Ticket descriptions fetched"
        );
        Ok(descriptions)
    }
}

/// Reduce rendered Jira HTML to readable plain text
pub fn html_to_text(html: &str) -> String {
    let with_breaks = BLOCK_BREAK.replace_all(html, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    BLANK_LINES
        .replace_all(decoded.trim(), "\n\n")
        .into_owned()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraIssue {
    key: String,
    fields: JiraFields,
    rendered_fields: Option<JiraRenderedFields>,
}

#[derive(Debug, Deserialize)]
struct JiraFields {
    summary: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JiraRenderedFields {
    description: Option<String>,
}

impl JiraIssue {
    /// Summary line followed by the rendered (or raw) description
    fn describe(self) -> String {
        let body = self
            .rendered_fields
            .and_then(|r| r.description)
            .map(|html| html_to_text(&html))
            .filter(|text| !text.is_empty())
            .or(self.fields.description)
            .unwrap_or_default();

        let summary = self.fields.summary.unwrap_or_else(|| self.key.clone());
        if body.trim().is_empty() {
            summary
        } else {
            format!("{}\n\n{}", summary, body.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> JiraTracker {
        JiraTracker::new(
            "https://acme.atlassian.net/",
            "dev@acme.test".to_string(),
            SecretString::from("jira-token".to_string()),
            5,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_set_makes_no_request() {
        // Unroutable base: any request would fail instead of returning an empty map
        let tracker = JiraTracker::new(
            "http://127.0.0.1:9",
            "dev@acme.test".to_string(),
            SecretString::from("jira-token".to_string()),
            1,
        )
        .unwrap();

        let described = tracker.describe(&BTreeSet::new()).await.unwrap();
        assert!(described.is_empty());
    }

    #[test]
    fn test_base_url_normalized_and_token_redacted() {
        let tracker = tracker();
        assert_eq!(tracker.base_url, "https://acme.atlassian.net");
        assert!(!format!("{:?}", tracker).contains("jira-token"));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = JiraTracker::new(
            "not a url",
            String::new(),
            SecretString::from(String::new()),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, RegriskError::Config(_)));
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>Checkout crashes when <b>user</b> is null.</p><p>Steps:<br/>1. Log out<br>2. Pay</p><p>a &amp; b &lt;c&gt;</p>";
        assert_eq!(
            html_to_text(html),
            "Checkout crashes when user is null.\nSteps:\n1. Log out\n2. Pay\na & b <c>"
        );
    }

    #[test]
    fn test_issue_prefers_rendered_description() {
        let issue: JiraIssue = serde_json::from_str(
            r#"{
                "key": "PAY-1",
                "fields": {"summary": "Null user crash", "description": "h1. raw *wiki*"},
                "renderedFields": {"description": "<p>Rendered body</p>"}
            }"#,
        )
        .unwrap();
        assert_eq!(issue.describe(), "Null user crash\n\nRendered body");
    }

    #[test]
    fn test_issue_without_description() {
        let issue: JiraIssue = serde_json::from_str(
            r#"{"key": "PAY-2", "fields": {"summary": null, "description": null}}"#,
        )
        .unwrap();
        assert_eq!(issue.describe(), "PAY-2");
    }
}
