//! Change Model
//!
//! Pull-request and file-history records consumed by prompt assembly.
//! Entries are built once by the source collaborator and then only read.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants::prompt::SHORT_REVISION_LEN;

/// Pull-request metadata needed to reconstruct history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    /// Revision the PR is based on; history is read up to this point
    pub base_revision: String,
    pub head_revision: String,
    /// Ticket ids mentioned in the PR title or body
    pub ticket_ids: BTreeSet<String>,
}

/// One file as reported by the source host's "files" listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    /// Host-specific status: added, modified, removed, renamed, ...
    pub status: String,
    /// Unified diff; absent for binary files and pure renames
    pub patch: Option<String>,
}

/// One prior commit touching a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalChange {
    pub ticket_ids: BTreeSet<String>,
    pub commit_message: String,
    revision: String,
    /// Full file-scoped patch, never capped
    pub diff: String,
}

impl HistoricalChange {
    pub fn new(
        ticket_ids: BTreeSet<String>,
        commit_message: impl Into<String>,
        revision: &str,
        diff: impl Into<String>,
    ) -> Self {
        Self {
            ticket_ids,
            commit_message: commit_message.into(),
            revision: short_revision(revision).to_string(),
            diff: diff.into(),
        }
    }

    /// Short revision prefix
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

/// One changed file under analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    path: String,
    current_changes: Option<String>,
    past_changes: Vec<HistoricalChange>,
}

impl ChangeEntry {
    pub fn new(
        path: impl Into<String>,
        current_changes: Option<String>,
        past_changes: Vec<HistoricalChange>,
    ) -> Self {
        Self {
            path: path.into(),
            current_changes,
            past_changes,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn current_changes(&self) -> Option<&str> {
        self.current_changes.as_deref()
    }

    pub fn past_changes(&self) -> &[HistoricalChange] {
        &self.past_changes
    }

    /// Union of ticket ids across the whole history
    pub fn ticket_ids(&self) -> BTreeSet<String> {
        self.past_changes
            .iter()
            .flat_map(|c| c.ticket_ids.iter().cloned())
            .collect()
    }
}

/// First `SHORT_REVISION_LEN` characters of a revision id
pub fn short_revision(revision: &str) -> &str {
    match revision.char_indices().nth(SHORT_REVISION_LEN) {
        Some((idx, _)) => &revision[..idx],
        None => revision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_is_shortened() {
        let change = HistoricalChange::new(BTreeSet::new(), "fix", "abcdef1234567890", "-a+b");
        assert_eq!(change.revision(), "abcdef12");
    }

    #[test]
    fn test_short_revision_keeps_short_ids() {
        assert_eq!(short_revision("abc"), "abc");
        assert_eq!(short_revision(""), "");
    }

    #[test]
    fn test_entry_ticket_union() {
        let past = vec![
            HistoricalChange::new(["T-1".to_string()].into(), "a", "1111111111", ""),
            HistoricalChange::new(
                ["T-2".to_string(), "T-1".to_string()].into(),
                "b",
                "2222222222",
                "",
            ),
        ];
        let entry = ChangeEntry::new("src/a.ts", Some("+x".into()), past);
        let ids: Vec<_> = entry.ticket_ids().into_iter().collect();
        assert_eq!(ids, vec!["T-1", "T-2"]);
        assert_eq!(entry.past_changes().len(), 2);
    }
}
