//! Markdown rendering of analysis results

use crate::review::{AnalysisOutcome, BatchReport};
use crate::types::PullRequestInfo;

/// One `##` section per file
pub fn render_outcome(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Analyzed { path, response, .. } => {
            format!("## `{}`\n\n{}\n", path, response.trim())
        }
        AnalysisOutcome::Failed {
            path,
            category,
            message,
            remediation,
        } => format!(
            "## `{}`\n\n> **Analysis failed** ({})\n>\n> {}\n>\n> Remediation: {}\n",
            path, category, message, remediation
        ),
    }
}

/// Full report: heading, per-file sections in input order, summary line
pub fn render_report(repository: &str, pr: &PullRequestInfo, report: &BatchReport) -> String {
    let mut doc = format!(
        "# Regression risk: {}#{}\n\n**{}**\n\n",
        repository, pr.number, pr.title
    );

    if !pr.ticket_ids.is_empty() {
        let ids: Vec<&str> = pr.ticket_ids.iter().map(String::as_str).collect();
        doc.push_str(&format!("Tickets: {}\n\n", ids.join(", ")));
    }

    for outcome in report.outcomes() {
        doc.push_str(&render_outcome(outcome));
        doc.push('\n');
    }

    doc.push_str(&format!("---\n\n_Run {}._\n", report.summary()));
    doc
}
