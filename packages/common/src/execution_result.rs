use crate::{SubmissionStatus, Verdict};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemErrorInfo {
    /// Machine-readable error code (e.g., "SANDBOX_LAUNCH").
    pub code: String,
    /// Human-readable error description.
    pub message: String,
}

impl SystemErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Terminal outcome of one submission, stored write-once under `result:<id>`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Id of the submission this result belongs to.
    pub id: String,
    /// Always `completed`; kept on the wire for readers that poll one key.
    #[serde(default = "completed")]
    pub status: SubmissionStatus,
    pub verdict: Verdict,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Structured error info (only for `Internal Error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<SystemErrorInfo>,
}

fn completed() -> SubmissionStatus {
    SubmissionStatus::Completed
}

impl ExecutionResult {
    pub fn new(id: impl Into<String>, verdict: Verdict, stdout: String, stderr: String) -> Self {
        Self {
            id: id.into(),
            status: SubmissionStatus::Completed,
            verdict,
            stdout,
            stderr,
            error_info: None,
        }
    }

    /// Result for a language with no registered runner.
    pub fn unsupported_language(id: impl Into<String>) -> Self {
        Self::new(id, Verdict::UnsupportedLanguage, String::new(), String::new())
    }

    /// Result indicating the sandbox could not be provisioned.
    pub fn internal_error(id: impl Into<String>, error_info: SystemErrorInfo) -> Self {
        Self {
            error_info: Some(error_info),
            ..Self::new(id, Verdict::InternalError, String::new(), String::new())
        }
    }
}
