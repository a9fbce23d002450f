//! Result of a chain scheduling request.

use serde::{Deserialize, Serialize};

/// Why nothing was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The trigger store is not authorized.
    Permissions,
    /// The shared trigger quota is exhausted.
    GlobalLimit,
    /// The anchor is not strictly in the future.
    InvalidConfiguration,
    /// Anything else, with detail text.
    Other(String),
}

impl UnavailableReason {
    /// Message suitable for the calling layer.
    pub fn message(&self) -> String {
        match self {
            Self::Permissions => "permission required to schedule alarms".into(),
            Self::GlobalLimit => "too many items scheduled system-wide".into(),
            Self::InvalidConfiguration => "alarm time must be in the future".into(),
            Self::Other(detail) => format!("scheduling failed: {detail}"),
        }
    }
}

/// Outcome of `schedule_chain`.
///
/// `Trimmed` is a partial success: the alarm is armed with fewer triggers
/// than ideal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// The full chain was scheduled.
    Scheduled {
        /// Triggers submitted.
        count: usize,
    },
    /// Fewer triggers than requested were scheduled.
    Trimmed {
        /// Triggers the policy asked for.
        requested: usize,
        /// Triggers actually submitted.
        granted: usize,
    },
    /// Nothing was scheduled.
    Unavailable {
        /// Cause.
        reason: UnavailableReason,
    },
}

impl ScheduleOutcome {
    /// Shorthand for an unavailable outcome.
    pub const fn unavailable(reason: UnavailableReason) -> Self {
        Self::Unavailable { reason }
    }

    /// True when at least the chain head is armed.
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }

    /// Number of triggers armed by this outcome.
    pub const fn scheduled_count(&self) -> usize {
        match self {
            Self::Scheduled { count } => *count,
            Self::Trimmed { granted, .. } => *granted,
            Self::Unavailable { .. } => 0,
        }
    }
}
