//! Regression Review
//!
//! Sequential batch analysis of change entries and its outcome model.

mod orchestrator;
mod report;

pub use orchestrator::{BatchOrchestrator, BatchSettings};
pub use report::{AnalysisOutcome, BatchReport, OutcomeSink};
