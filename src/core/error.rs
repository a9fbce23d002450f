//! Error types for chain scheduling operations.

use thiserror::Error;

/// Errors produced by scheduler components.
///
/// Permission, quota and anchor problems never escape the public scheduling
/// operations as `Err`; they are folded into
/// [`ScheduleOutcome::Unavailable`](crate::core::ScheduleOutcome). The variants
/// exist so internal layers and adapters can report them precisely.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Trigger store authorization is not granted.
    #[error("permission denied")]
    PermissionDenied,
    /// No quota left in the shared trigger budget.
    #[error("global trigger limit unavailable")]
    GlobalLimitUnavailable,
    /// Anchor date or settings cannot produce a valid chain.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Some submissions of a chain failed.
    #[error("partial submission failure: {failed} of {attempted} failed")]
    PartialSubmissionFailure {
        /// Number of failed submissions.
        failed: usize,
        /// Number of attempted submissions.
        attempted: usize,
    },
    /// A persisted index entry could not be decoded.
    #[error("index parse failure for `{key}`: {reason}")]
    IndexParseFailure {
        /// Key of the corrupted entry.
        key: String,
        /// Decoder message.
        reason: String,
    },
    /// Trigger store failure with context.
    #[error("store error: {0}")]
    Store(String),
    /// Key-value persistence failure with context.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
