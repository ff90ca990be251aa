//! Batch outcomes
//!
//! One [`AnalysisOutcome`] per entry, in input order, and the run summary.

use serde::Serialize;

use crate::types::ErrorCategory;

/// Result of analyzing a single entry
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Analyzed {
        path: String,
        response: String,
        /// Rate-limit retries before the answer arrived
        retries: u32,
    },
    Failed {
        path: String,
        #[serde(serialize_with = "serialize_category")]
        category: ErrorCategory,
        message: String,
        remediation: &'static str,
    },
}

fn serialize_category<S: serde::Serializer>(
    category: &ErrorCategory,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(category)
}

impl AnalysisOutcome {
    pub fn path(&self) -> &str {
        match self {
            Self::Analyzed { path, .. } | Self::Failed { path, .. } => path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Analyzed { .. })
    }

    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Analyzed { response, .. } => Some(response),
            Self::Failed { .. } => None,
        }
    }
}

/// Receives each outcome as soon as it is known
pub trait OutcomeSink {
    fn record(&mut self, outcome: &AnalysisOutcome);
}

impl OutcomeSink for Vec<AnalysisOutcome> {
    fn record(&mut self, outcome: &AnalysisOutcome) {
        self.push(outcome.clone());
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    outcomes: Vec<AnalysisOutcome>,
}

impl BatchReport {
    pub fn new(outcomes: Vec<AnalysisOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[AnalysisOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Backoff sleeps across all successful entries
    pub fn total_retries(&self) -> u32 {
        self.outcomes
            .iter()
            .map(|o| match o {
                AnalysisOutcome::Analyzed { retries, .. } => *retries,
                AnalysisOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "completed with {}/{} items successfully analyzed",
            self.succeeded(),
            self.total()
        )
    }
}
