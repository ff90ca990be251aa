pub mod snapshot;

pub use snapshot::{EvidenceSnapshot, FileSummary, persist_or_print, write_snapshot};
