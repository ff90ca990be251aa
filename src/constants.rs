//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Token estimation constants
pub mod tokens {
    /// Characters per token for the conservative estimator
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Prompts above this estimate produce a warning (not an error)
    pub const LARGE_PROMPT_THRESHOLD: u64 = 100_000;
}

/// Retry driver constants
pub mod retry {
    /// Maximum retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 2_000;

    /// Maximum delay between retries (milliseconds)
    pub const MAX_DELAY_MS: u64 = 60_000;

    /// Lower bound on any computed backoff delay (milliseconds)
    pub const MIN_DELAY_MS: u64 = 1_000;

    /// Symmetric jitter ratio applied to the exponential delay
    pub const JITTER_RATIO: f64 = 0.25;

    /// Added on top of a provider-supplied retry hint (milliseconds)
    pub const RETRY_HINT_BUFFER_MS: u64 = 1_000;

    /// Provider retry hints above this are clamped (seconds)
    pub const MAX_RETRY_HINT_SECS: u64 = 300;
}

/// Rate window constants
pub mod throttle {
    /// Length of one accounting window (milliseconds)
    pub const WINDOW_MS: u64 = 60_000;

    /// Local per-minute token ceiling.
    ///
    /// Half of the provider's published 30k/min so that estimation error and
    /// external usage of the same key still fit.
    pub const TOKENS_PER_MINUTE: u64 = 15_000;

    /// Extra wait after a window elapses before the counter is trusted again
    pub const WINDOW_BUFFER_MS: u64 = 1_000;

    /// Pause between consecutive inference calls (milliseconds)
    pub const INTER_REQUEST_DELAY_MS: u64 = 2_000;
}

/// Prompt assembly constants
pub mod prompt {
    /// Commit messages are cut to this many characters
    pub const MAX_COMMIT_MESSAGE_CHARS: usize = 500;

    /// Revisions are shortened to this prefix length
    pub const SHORT_REVISION_LEN: usize = 8;
}

/// Source host / tracker fetch constants
pub mod fetch {
    /// Default GitHub REST endpoint
    pub const GITHUB_API: &str = "https://api.github.com";

    /// Page size for paginated list endpoints
    pub const PER_PAGE: usize = 100;

    /// Concurrent history fetches per run
    pub const HISTORY_CONCURRENCY: usize = 4;

    /// Commit message prefixes treated as merge noise
    pub const MERGE_PREFIXES: &[&str] = &[
        "Merge branch",
        "Merge pull request",
        "Merge remote-tracking branch",
        "Merge tag",
    ];
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Timeout for source host and tracker requests (seconds)
    pub const FETCH_TIMEOUT_SECS: u64 = 30;

    /// User agent sent to every HTTP endpoint
    pub const USER_AGENT: &str = concat!("regrisk/", env!("CARGO_PKG_VERSION"));
}
