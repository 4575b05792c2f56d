use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submission_status::{StatusTransitionError, SubmissionStatus};

/// Execution limits attached to a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionLimits {
    /// Wall-clock deadline in milliseconds.
    pub time_limit_ms: u64,
    /// Memory cap in megabytes.
    pub memory_limit_mb: u64,
}

/// A submission as supplied by a producer, before an id is assigned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSubmission {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
}

impl NewSubmission {
    /// Check the producer-supplied fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.language.trim().is_empty() {
            return Err("language must not be empty".into());
        }
        if self.time_limit_ms == 0 {
            return Err("time_limit_ms must be a positive integer".into());
        }
        if self.memory_limit_mb == 0 {
            return Err("memory_limit_mb must be a positive integer".into());
        }
        Ok(())
    }

    /// Assign a fresh UUID and the initial `queued` status.
    pub fn into_submission(self) -> Submission {
        Submission {
            id: Uuid::new_v4().to_string(),
            language: self.language,
            code: self.code,
            input: self.input,
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
            status: SubmissionStatus::Queued,
        }
    }
}

/// A unit of untrusted code plus its execution limits.
///
/// Stored as JSON under `submission:<id>`; the job queue carries only `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub status: SubmissionStatus,
}

impl Submission {
    pub fn limits(&self) -> SubmissionLimits {
        SubmissionLimits {
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
        }
    }

    /// Move the status forward, rejecting any other transition.
    pub fn advance(&mut self, next: SubmissionStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_advance_to(next) {
            return Err(StatusTransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
