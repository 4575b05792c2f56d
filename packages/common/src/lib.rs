pub mod config;
pub mod execution_result;
pub mod mq;
pub mod retry;
pub mod storage;
pub mod submission;
pub mod submission_status;

pub use config::RedisConfig;
pub use execution_result::{ExecutionResult, SystemErrorInfo};
pub use mq::JobQueue;
pub use storage::{MetadataStore, StorageError};
pub use submission::{NewSubmission, Submission, SubmissionLimits};
pub use submission_status::{StatusTransitionError, SubmissionStatus, Verdict};
