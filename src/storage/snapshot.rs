//! Evidence Snapshot
//!
//! The gathered input (PR tickets, per-file change summaries, resolved ticket
//! descriptions) is written once before analysis starts, so a crash mid-batch
//! does not lose it. Failing to write is never fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{ChangeEntry, PullRequestInfo, RegriskError, Result};

/// Aggregated input of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub repository: String,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_ticket_ids: BTreeSet<String>,
    pub files: Vec<FileSummary>,
    pub tickets: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Compact description of one entry's evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    /// Lines in the PR's own diff; zero for pure renames
    pub current_change_lines: usize,
    pub past_change_count: usize,
    /// Short revisions in history order
    pub revisions: Vec<String>,
    pub ticket_ids: BTreeSet<String>,
}

impl From<&ChangeEntry> for FileSummary {
    fn from(entry: &ChangeEntry) -> Self {
        Self {
            path: entry.path().to_string(),
            current_change_lines: entry.current_changes().map_or(0, |d| d.lines().count()),
            past_change_count: entry.past_changes().len(),
            revisions: entry
                .past_changes()
                .iter()
                .map(|c| c.revision().to_string())
                .collect(),
            ticket_ids: entry.ticket_ids(),
        }
    }
}

impl EvidenceSnapshot {
    pub fn new(
        repository: &str,
        pr: &PullRequestInfo,
        entries: &[ChangeEntry],
        tickets: BTreeMap<String, String>,
    ) -> Self {
        Self {
            repository: repository.to_string(),
            pr_number: pr.number,
            pr_title: pr.title.clone(),
            pr_ticket_ids: pr.ticket_ids.clone(),
            files: entries.iter().map(FileSummary::from).collect(),
            tickets,
            created_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("pr-{}-context.json", self.pr_number)
    }
}

/// Write `snapshot` as pretty JSON under `dir`
pub fn write_snapshot(dir: &Path, snapshot: &EvidenceSnapshot) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let path = dir.join(snapshot.file_name());

    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, json))
        .map_err(|e| RegriskError::Snapshot(format!("{}: {}", path.display(), e)))?;

    info!(path = %path.display(), files = snapshot.files.len(), "Evidence snapshot written");
    Ok(path)
}

/// Write the snapshot, or print it to stdout when it cannot be written
pub fn persist_or_print(dir: &Path, snapshot: &EvidenceSnapshot) -> Option<PathBuf> {
    match write_snapshot(dir, snapshot) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "Could not persist evidence snapshot, printing it instead");
            match serde_json::to_string_pretty(snapshot) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(error = %e, "Could not serialize evidence snapshot"),
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HistoricalChange;
    use tempfile::TempDir;

    fn snapshot() -> EvidenceSnapshot {
        let pr = PullRequestInfo {
            number: 42,
            title: "PAY-9 round totals".to_string(),
            body: None,
            base_revision: "base".to_string(),
            head_revision: "head".to_string(),
            ticket_ids: BTreeSet::from(["PAY-9".to_string()]),
        };
        let entries = vec![
            ChangeEntry::new("a.ts", Some("+x\n+y".to_string()), Vec::new()),
            ChangeEntry::new(
                "b.ts",
                None,
                vec![HistoricalChange::new(
                    BTreeSet::from(["T-1".to_string()]),
                    "fix",
                    "abcdef1234567890",
                    "-old+new",
                )],
            ),
        ];
        let tickets = BTreeMap::from([("T-1".to_string(), "Null user".to_string())]);
        EvidenceSnapshot::new("acme/shop", &pr, &entries, tickets)
    }

    #[test]
    fn test_write_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested/snapshots");

        let path = write_snapshot(&dir, &snapshot()).unwrap();
        assert_eq!(path.file_name().unwrap(), "pr-42-context.json");

        let loaded: EvidenceSnapshot =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.repository, "acme/shop");
        assert_eq!(loaded.files[0].current_change_lines, 2);
        assert_eq!(loaded.files[1].current_change_lines, 0);
        assert_eq!(loaded.files[1].revisions, vec!["abcdef12"]);
        assert_eq!(loaded.tickets["T-1"], "Null user");
    }

    #[test]
    fn test_unwritable_dir_is_reported_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        // a file where the directory should be
        let blocker = temp_dir.path().join("blocked");
        fs::write(&blocker, "x").unwrap();

        let err = write_snapshot(&blocker, &snapshot()).unwrap_err();
        assert!(matches!(err, RegriskError::Snapshot(_)));
        assert_eq!(persist_or_print(&blocker, &snapshot()), None);
    }
}
