//! Error taxonomy for the fetch engine.
//!
//! Every variant carries the stable stderr prefix quoted in the design
//! documentation. Exit code is always 1 for a non-success termination;
//! callers distinguish failures by message, not by code (the one exception
//! is the cancelled-by-signal path, which `main` also maps to a non-zero
//! exit but flags distinctly for shell scripting).

use std::path::PathBuf;

/// Errors surfaced to the user by the fetch engine.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Bad repository format, conflicting flags, or an out-of-range batch size.
    #[error("invalid repository format: {0}")]
    InvalidRepository(String),

    /// A flag combination the `QueryPlanner` rejects before any request is sent.
    #[error("invalid parameters: {0}")]
    Parameter(String),

    /// Missing or invalid auth token, or a 401/403 the `RetryController`
    /// could not attribute to rate limiting.
    #[error("GitHub token not found: {0}")]
    Auth(String),

    /// Transport failures that exhausted the retry budget.
    #[error("network error: {0}")]
    Network(String),

    /// A rate-limit wait that would exceed the configured ceiling.
    #[error("rate limit wait time exceeds maximum: {0}")]
    RateLimitTooLong(String),

    /// GraphQL errors the `RetryController` did not classify as complexity.
    #[error("GitHub API error: {0}")]
    Remote(String),

    /// Filesystem failures: permission denied, path is a directory, missing
    /// parent, or a failed fsync.
    #[error("filesystem error: {0}")]
    Filesystem {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// State-file problems: checksum mismatch (corruption) or a missing
    /// prior checkpoint for `--incremental`.
    #[error("{0}")]
    State(String),

    /// The run was cancelled by a signal or an owning context.
    #[error("cancelled by user")]
    Cancelled,

    /// JSON (de)serialization failures not otherwise classified above.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    pub fn no_previous_state() -> Self {
        Self::State("no previous state found".to_string())
    }

    pub fn state_corrupt(path: &std::path::Path) -> Self {
        Self::State(format!(
            "state file at '{}' failed checksum validation",
            path.display()
        ))
    }

    pub fn filesystem(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Filesystem {
            source,
            path: path.into(),
        }
    }

    /// Process exit code for this error. Every kind exits 1; callers that
    /// need to distinguish the cancelled-by-signal case check
    /// `matches!(err, RelayError::Cancelled)` instead of the code.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
