pub mod change;
pub mod error;

pub use change::{ChangeEntry, ChangedFile, HistoricalChange, PullRequestInfo, short_revision};
pub use error::{ErrorCategory, ErrorClassifier, LlmError, RegriskError, Result};
