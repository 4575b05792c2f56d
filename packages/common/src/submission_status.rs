use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a submission.
///
/// Variants are declared in lifecycle order, so the derived `Ord` doubles as
/// the "forward" relation used by [`SubmissionStatus::can_advance_to`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Stored and enqueued, waiting for a worker.
    #[default]
    Queued,
    /// Claimed by a worker and executing.
    Running,
    /// A result has been written.
    Completed,
}

impl SubmissionStatus {
    /// All possible status values, in lifecycle order.
    pub const ALL: &'static [SubmissionStatus] = &[Self::Queued, Self::Running, Self::Completed];

    /// Returns true once a result exists for the submission.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Status only ever moves forward.
    pub fn can_advance_to(&self, next: SubmissionStatus) -> bool {
        next > *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            SubmissionStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for SubmissionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}

/// Rejected attempt to move a submission's status sideways or backwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("submission {id}: cannot move status from {from} to {to}")]
pub struct StatusTransitionError {
    pub id: String,
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}

/// Terminal classification of one execution attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Ran to completion within the deadline and wrote nothing to stderr.
    #[serde(rename = "Accepted")]
    Accepted,
    /// Wrote diagnostics to stderr (or exited non-zero, under the exit-code policy).
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    /// Killed at the wall-clock deadline.
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    /// No runner registered for the submission's language.
    #[serde(rename = "Unsupported Language")]
    UnsupportedLanguage,
    /// The sandbox could not be provisioned; not attributable to the submitter.
    #[serde(rename = "Internal Error")]
    InternalError,
}

impl Verdict {
    pub const ALL: &'static [Verdict] = &[
        Self::Accepted,
        Self::RuntimeError,
        Self::TimeLimitExceeded,
        Self::UnsupportedLanguage,
        Self::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::RuntimeError => "Runtime Error",
            Self::TimeLimitExceeded => "Time Limit Exceeded",
            Self::UnsupportedLanguage => "Unsupported Language",
            Self::InternalError => "Internal Error",
        }
    }

    /// Returns true for verdicts caused by infrastructure rather than the submitted code.
    pub fn is_system_error(&self) -> bool {
        matches!(self, Self::InternalError)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid verdict string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVerdictError {
    invalid: String,
}

impl fmt::Display for ParseVerdictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid verdict '{}'", self.invalid)
    }
}

impl std::error::Error for ParseVerdictError {}

impl FromStr for Verdict {
    type Err = ParseVerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseVerdictError {
                invalid: s.to_string(),
            })
    }
}
