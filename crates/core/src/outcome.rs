//! Tagged Unit-of-Work Outcomes
//!
//! Every phase and every probe settles into exactly one `Outcome`. Failures
//! and timeouts are values, not errors, so aggregation can match on them
//! exhaustively.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum score any unit of work can report.
pub const MAX_SCORE: u8 = 100;

/// Settled result of one phase or probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The work finished and produced a payload and a 0-100 score
    Completed { payload: T, score: u8 },
    /// The work returned an error, panicked, or was forced to fail
    Failed { reason: String },
    /// The work did not settle before its deadline
    TimedOut { after_ms: u64 },
}

impl<T> Outcome<T> {
    /// Create a completed outcome. Scores above 100 are clamped.
    pub fn completed(payload: T, score: u8) -> Self {
        Self::Completed {
            payload,
            score: score.min(MAX_SCORE),
        }
    }

    /// Create a failed outcome.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Create a timed-out outcome.
    pub fn timed_out(after: Duration) -> Self {
        Self::TimedOut {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Score contributed by this outcome; degraded outcomes contribute 0.
    pub fn score(&self) -> u8 {
        match self {
            Self::Completed { score, .. } => *score,
            Self::Failed { .. } | Self::TimedOut { .. } => 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Whether this outcome is `Failed` or `TimedOut`.
    pub fn is_degraded(&self) -> bool {
        !self.is_completed()
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Completed { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Human-readable reason for a degraded outcome.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason } => Some(reason.clone()),
            Self::TimedOut { after_ms } => Some(format!("timed out after {} ms", after_ms)),
        }
    }

    /// Short status label ("completed", "failed", "timed_out").
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}
