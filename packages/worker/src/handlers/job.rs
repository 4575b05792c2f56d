use std::future::Future;
use std::sync::Arc;

use common::retry::{RetryPolicy, retry_with_backoff};
use common::{ExecutionResult, MetadataStore, StorageError, SubmissionStatus, Verdict};
use tracing::{Span, error, info, instrument, warn};

use crate::error::{Result, WorkerError};
use crate::models::executor::{ExecutionOutcome, SandboxExecutor};
use crate::models::language::RunnerRegistry;
use crate::models::sandbox::error::SandboxError;

/// Immutable handles shared by every job loop.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn MetadataStore>,
    pub registry: Arc<RunnerRegistry>,
    pub executor: Arc<SandboxExecutor>,
    pub retry: RetryPolicy,
}

/// How a dequeued id was disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// A result was written with this verdict.
    Completed(Verdict),
    /// No submission record exists for the id.
    Missing,
    /// The submission already has a result; nothing was executed or written.
    Duplicate,
}

async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, StorageError>>,
{
    retry_with_backoff(policy, operation, op)
        .await
        .map_err(|exhausted| {
            error!(
                operation,
                attempts = exhausted.history.len(),
                error = %exhausted.last_error,
                "Storage retries exhausted"
            );
            WorkerError::Storage(exhausted.last_error)
        })
}

/// Take one submission from `queued` to a stored result.
#[instrument(skip(ctx), fields(language = tracing::field::Empty))]
pub async fn handle_job(ctx: &JobContext, submission_id: &str) -> Result<JobOutcome> {
    let store = ctx.store.as_ref();
    let policy = &ctx.retry;

    let loaded = with_retry(policy, "load_submission", || {
        store.load_submission(submission_id)
    })
    .await?;
    let Some(mut submission) = loaded else {
        warn!("Submission not found, dropping job");
        return Ok(JobOutcome::Missing);
    };
    Span::current().record("language", submission.language.as_str());

    let existing = with_retry(policy, "load_result", || store.load_result(submission_id)).await?;
    if submission.status.is_final() || existing.is_some() {
        info!(status = %submission.status, "Result already stored, skipping duplicate delivery");
        return Ok(JobOutcome::Duplicate);
    }

    match submission.status {
        SubmissionStatus::Queued => {
            submission.advance(SubmissionStatus::Running)?;
            with_retry(policy, "save_submission", || store.save_submission(&submission)).await?;
        }
        // Left behind by a worker that stopped mid-run; run it again.
        _ => info!(status = %submission.status, "Resuming submission without a result"),
    }

    let result = match ctx.registry.resolve(&submission.language) {
        Some(runner) => {
            let outcome = runner.invoke(&ctx.executor, &submission).await;
            if let ExecutionOutcome::InternalError(info) = &outcome {
                error!(
                    code = %info.code,
                    message = %info.message,
                    runtime = ctx.executor.runtime_name(),
                    "{}",
                    SandboxError::summary(&info.code)
                );
            }
            outcome.into_result(&submission.id)
        }
        None => {
            info!("No runner registered for language");
            ExecutionResult::unsupported_language(&submission.id)
        }
    };
    let verdict = result.verdict;

    let written = with_retry(policy, "save_result", || store.save_result(&result)).await?;

    submission.advance(SubmissionStatus::Completed)?;
    if let Err(e) = store.save_submission(&submission).await {
        // The result is authoritative; the record only trails it.
        warn!(error = %e, "Failed to mark submission completed");
    }

    if !written {
        warn!("Another result was stored first; keeping it");
        return Ok(JobOutcome::Duplicate);
    }

    info!(verdict = %verdict, "Submission completed");
    Ok(JobOutcome::Completed(verdict))
}
