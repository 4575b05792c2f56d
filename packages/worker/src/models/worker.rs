use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::retry::calculate_backoff;
use common::{JobQueue, StorageError};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DequeueMode, WorkerSettings};
use crate::error::WorkerError;
use crate::handlers::job::{JobContext, JobOutcome, handle_job};

/// Shared liveness flag, cleared after repeated store or queue failures.
#[derive(Debug, Clone)]
pub struct Health {
    healthy: Arc<AtomicBool>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Sets the flag and returns the previous value.
    fn set(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::SeqCst)
    }
}

/// What one pass of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// The queue was empty.
    Idle,
    Handled(JobOutcome),
    /// The job errored or panicked and was skipped.
    Failed,
}

/// One job loop: pops ids and runs them through [`handle_job`] one at a time.
pub struct Worker {
    id: String,
    queue: Arc<dyn JobQueue>,
    ctx: Arc<JobContext>,
    settings: WorkerSettings,
    health: Health,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        ctx: Arc<JobContext>,
        settings: WorkerSettings,
        health: Health,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            ctx,
            settings,
            health,
        }
    }

    /// Loop until `shutdown` fires. A job already dequeued always finishes first.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker_id = %self.id, mode = ?self.settings.dequeue_mode, "Worker loop started");

        let mut idle_streak: u8 = 0;
        let mut failures: u32 = 0;

        while !shutdown.is_cancelled() {
            let pause = match self.run_once().await {
                Ok(cycle) => {
                    self.record_success(&mut failures);
                    if cycle == Cycle::Idle {
                        self.idle_delay(&mut idle_streak)
                    } else {
                        idle_streak = 0;
                        Duration::ZERO
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.record_failure(failures, &e);
                    let attempt = u8::try_from(failures).unwrap_or(u8::MAX);
                    calculate_backoff(
                        attempt,
                        self.settings.retry.base_delay_ms,
                        self.settings.retry.max_delay_ms,
                    )
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(worker_id = %self.id, "Worker loop stopped");
    }

    /// Pop at most one id and handle it.
    ///
    /// A failing dequeue, or a store that stays unreachable through the job's
    /// retries, is an error; the id is pushed back so it is not lost. Anything
    /// else that goes wrong inside the job is logged and reported as
    /// [`Cycle::Failed`].
    pub async fn run_once(&self) -> Result<Cycle, StorageError> {
        let Some(submission_id) = self.queue.dequeue(self.settings.dequeue_wait()).await? else {
            return Ok(Cycle::Idle);
        };

        let job = handle_job(&self.ctx, &submission_id);
        let cycle = match AssertUnwindSafe(job).catch_unwind().await {
            Ok(Ok(outcome)) => Cycle::Handled(outcome),
            Ok(Err(WorkerError::Storage(e))) => {
                self.requeue(&submission_id).await;
                return Err(e);
            }
            Ok(Err(e)) => {
                error!(worker_id = %self.id, submission_id = %submission_id, error = %e, "Job failed, skipping");
                Cycle::Failed
            }
            Err(panic) => {
                error!(
                    worker_id = %self.id,
                    submission_id = %submission_id,
                    panic = panic_message(panic.as_ref()),
                    "Job panicked, skipping"
                );
                Cycle::Failed
            }
        };
        Ok(cycle)
    }

    async fn requeue(&self, submission_id: &str) {
        match self.queue.enqueue(submission_id).await {
            Ok(()) => warn!(worker_id = %self.id, submission_id, "Store unavailable, job requeued"),
            Err(e) => error!(
                worker_id = %self.id,
                submission_id,
                error = %e,
                "Store unavailable and requeue failed, job lost"
            ),
        }
    }

    fn idle_delay(&self, streak: &mut u8) -> Duration {
        match self.settings.dequeue_mode {
            // The pop itself already waited.
            DequeueMode::Blocking => Duration::ZERO,
            DequeueMode::Polling => {
                *streak = streak.saturating_add(1);
                calculate_backoff(
                    *streak,
                    self.settings.poll_base_delay_ms,
                    self.settings.poll_max_delay_ms,
                )
            }
        }
    }

    fn record_success(&self, failures: &mut u32) {
        if *failures == 0 {
            return;
        }
        *failures = 0;
        if !self.health.set(true) {
            info!(worker_id = %self.id, "Backend reachable again, worker healthy");
        }
    }

    fn record_failure(&self, failures: u32, err: &StorageError) {
        if failures >= self.settings.unhealthy_after {
            if self.health.set(false) {
                error!(
                    worker_id = %self.id,
                    failures,
                    error = %err,
                    "Backend unreachable, worker unhealthy"
                );
            }
        } else {
            warn!(worker_id = %self.id, failures, error = %err, "Backend operation failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::executor::{ExecutionOutcome, SandboxExecutor};
    use crate::models::language::LanguageRunner;
    use crate::models::sandbox::RunnerConfig;
    use crate::test_support::{context, fast_retry, sh_registry, stored_submission};
    use async_trait::async_trait;
    use common::storage::MemoryStore;
    use common::{MetadataStore, Submission, SubmissionStatus, Verdict};
    use mq::{Intake, MemoryQueue};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn polling() -> WorkerSettings {
        WorkerSettings {
            dequeue_mode: DequeueMode::Polling,
            poll_base_delay_ms: 1,
            poll_max_delay_ms: 5,
            unhealthy_after: 2,
            retry: fast_retry(),
            ..WorkerSettings::default()
        }
    }

    fn worker(queue: Arc<dyn JobQueue>, ctx: JobContext, health: Health) -> Worker {
        Worker::new("test", queue, Arc::new(ctx), polling(), health)
    }

    async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    struct PanickingRunner {
        config: RunnerConfig,
    }

    #[async_trait]
    impl LanguageRunner for PanickingRunner {
        fn config(&self) -> &RunnerConfig {
            &self.config
        }

        async fn invoke(&self, _: &SandboxExecutor, _: &Submission) -> ExecutionOutcome {
            panic!("runner exploded")
        }
    }

    struct DownQueue {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for DownQueue {
        async fn enqueue(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend("connection refused".into()))
        }

        async fn dequeue(&self, _: Duration) -> Result<Option<String>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("connection refused".into()))
        }

        async fn len(&self) -> Result<usize, StorageError> {
            Err(StorageError::Backend("connection refused".into()))
        }
    }

    /// Memory store that can be switched off.
    #[derive(Default)]
    struct SwitchableStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    impl SwitchableStore {
        fn check(&self) -> Result<(), StorageError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MetadataStore for SwitchableStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.check()?;
            self.inner.set(key, value).await
        }

        async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StorageError> {
            self.check()?;
            self.inner.set_if_absent(key, value).await
        }
    }

    fn switchable_context(store: Arc<SwitchableStore>) -> JobContext {
        let (mut ctx, _) = context(Arc::new(MemoryStore::new()), sh_registry());
        ctx.store = store;
        ctx
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error_and_keeps_the_id() {
        let store = Arc::new(SwitchableStore::default());
        let queue = Arc::new(MemoryQueue::new());
        let submission = stored_submission(&store.inner, "sh", "echo hi").await;
        queue.enqueue(&submission.id).await.unwrap();
        store.down.store(true, Ordering::SeqCst);

        let worker = worker(queue.clone(), switchable_context(store), Health::new());

        assert!(worker.run_once().await.is_err());
        assert_eq!(
            queue.dequeue(Duration::ZERO).await.unwrap(),
            Some(submission.id)
        );
    }

    #[tokio::test]
    async fn test_store_outage_marks_unhealthy_without_losing_jobs() {
        let store = Arc::new(SwitchableStore::default());
        let queue = Arc::new(MemoryQueue::new());
        let mut ids = Vec::new();
        for i in 0..10 {
            let submission = stored_submission(&store.inner, "sh", &format!("echo {i}")).await;
            queue.enqueue(&submission.id).await.unwrap();
            ids.push(submission.id);
        }
        store.down.store(true, Ordering::SeqCst);

        let health = Health::new();
        let worker = Arc::new(worker(
            queue.clone(),
            switchable_context(store.clone()),
            health.clone(),
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        wait_until("unhealthy", || !health.is_healthy()).await;
        // At most the id currently being retried is off the queue.
        assert!(queue.len().await.unwrap() >= 9);

        store.down.store(false, Ordering::SeqCst);
        wait_until("all results", || {
            ids.iter()
                .all(|id| store.inner.contains_key(&common::storage::result_key(id)))
        })
        .await;
        wait_until("healthy", || health.is_healthy()).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _) = context(store, sh_registry());
        let worker = worker(Arc::new(MemoryQueue::new()), ctx, Health::new());

        assert_eq!(worker.run_once().await.unwrap(), Cycle::Idle);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_the_loop() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let mut registry = sh_registry();
        registry.register(
            "boom",
            Arc::new(PanickingRunner {
                config: RunnerConfig {
                    image: String::new(),
                    command: vec!["true".into()],
                    file_name: "main".into(),
                },
            }),
        );
        let (ctx, _) = context(store.clone(), registry);
        let worker = worker(queue.clone(), ctx, Health::new());

        let bad = stored_submission(&store, "boom", "").await;
        let good = stored_submission(&store, "sh", "echo ok").await;
        queue.enqueue(&bad.id).await.unwrap();
        queue.enqueue(&good.id).await.unwrap();

        assert_eq!(worker.run_once().await.unwrap(), Cycle::Failed);
        assert_eq!(
            worker.run_once().await.unwrap(),
            Cycle::Handled(JobOutcome::Completed(Verdict::Accepted))
        );
        assert!(store.load_result(&bad.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let intake = Intake::new(store.clone(), queue.clone());
        let (ctx, runtime) = context(store.clone(), sh_registry());
        let worker = Arc::new(worker(queue.clone(), ctx, Health::new()));

        let mut ids = Vec::new();
        for (language, code) in [("sh", "echo a"), ("sh", "echo b >&2"), ("cobol", "")] {
            let ticket = intake
                .submit(common::NewSubmission {
                    language: language.into(),
                    code: code.into(),
                    input: String::new(),
                    time_limit_ms: 5000,
                    memory_limit_mb: 256,
                })
                .await
                .unwrap();
            assert_eq!(ticket.status, SubmissionStatus::Queued);
            ids.push(ticket.id);
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        wait_until("all results", || {
            ids.iter()
                .all(|id| store.contains_key(&common::storage::result_key(id)))
        })
        .await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let verdicts: Vec<_> = futures::future::join_all(ids.iter().map(|id| intake.query(id)))
            .await
            .into_iter()
            .map(|view| match view.unwrap() {
                mq::SubmissionView::Completed(result) => result.verdict,
                other => panic!("expected a result, got {other:?}"),
            })
            .collect();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Accepted,
                Verdict::RuntimeError,
                Verdict::UnsupportedLanguage
            ]
        );
        assert_eq!(runtime.launches(), 2);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_queue_failures_mark_unhealthy() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _) = context(store, sh_registry());
        let health = Health::new();
        let queue = Arc::new(DownQueue {
            calls: AtomicUsize::new(0),
        });
        let worker = Arc::new(worker(queue.clone(), ctx, health.clone()));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        wait_until("unhealthy", || !health.is_healthy()).await;
        assert!(queue.calls.load(Ordering::SeqCst) >= 2);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_panic_message_handles_both_payload_kinds() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
