//! Producer side of the pipeline: accepting submissions and serving their status.

use common::{
    ExecutionResult, JobQueue, MetadataStore, NewSubmission, StorageError, SubmissionStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Invalid submission: {0}")]
    Invalid(String),

    #[error("Submission not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Returned to the producer once a submission is stored and enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionTicket {
    pub id: String,
    pub status: SubmissionStatus,
}

/// What a status query sees: the result once present, the live status before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionView {
    Completed(ExecutionResult),
    Pending {
        id: String,
        status: SubmissionStatus,
    },
}

impl SubmissionView {
    pub fn status(&self) -> SubmissionStatus {
        match self {
            Self::Completed(result) => result.status,
            Self::Pending { status, .. } => *status,
        }
    }
}

#[derive(Clone)]
pub struct Intake {
    store: Arc<dyn MetadataStore>,
    queue: Arc<dyn JobQueue>,
}

impl Intake {
    pub fn new(store: Arc<dyn MetadataStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Store a new submission as `queued` and push its id onto the queue.
    ///
    /// The record is written before the id is enqueued, so a worker never
    /// pops an id whose payload is not yet readable.
    #[instrument(skip_all, fields(language = %new.language))]
    pub async fn submit(&self, new: NewSubmission) -> Result<SubmissionTicket, IntakeError> {
        new.validate().map_err(IntakeError::Invalid)?;

        let submission = new.into_submission();
        self.store.save_submission(&submission).await?;
        self.queue.enqueue(&submission.id).await?;

        info!(submission_id = %submission.id, "Submission queued");

        Ok(SubmissionTicket {
            id: submission.id,
            status: submission.status,
        })
    }

    /// Look up a submission: its result if completed, otherwise its current status.
    pub async fn query(&self, id: &str) -> Result<SubmissionView, IntakeError> {
        if let Some(result) = self.store.load_result(id).await? {
            return Ok(SubmissionView::Completed(result));
        }

        let submission = self
            .store
            .load_submission(id)
            .await?
            .ok_or_else(|| IntakeError::NotFound(id.to_string()))?;

        Ok(SubmissionView::Pending {
            id: submission.id,
            status: submission.status,
        })
    }

    /// Number of submissions waiting for a worker.
    pub async fn backlog(&self) -> Result<usize, IntakeError> {
        Ok(self.queue.len().await?)
    }
}
