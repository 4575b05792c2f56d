//! Fixtures shared by the job and worker loop tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::retry::RetryPolicy;
use common::storage::MemoryStore;
use common::{MetadataStore, NewSubmission, Submission};
use tokio::process::Command;

use crate::handlers::job::JobContext;
use crate::models::executor::{ExecutorSettings, SandboxExecutor};
use crate::models::language::{RunnerRegistry, ScriptRunner};
use crate::models::sandbox::error::SandboxError;
use crate::models::sandbox::{Invocation, ProcessRuntime, RunnerConfig, SandboxRuntime};

/// Host-process runtime that counts launches.
#[derive(Default)]
pub struct CountingRuntime {
    launches: AtomicUsize,
}

impl CountingRuntime {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxRuntime for CountingRuntime {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn command(&self, invocation: &Invocation) -> Result<Command, SandboxError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        ProcessRuntime::new("/code").command(invocation)
    }

    async fn terminate(&self, invocation: &Invocation, pid: Option<u32>) {
        ProcessRuntime::new("/code").terminate(invocation, pid).await;
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}

/// Registry with only `sh`, so tests do not depend on a Python install.
pub fn sh_registry() -> RunnerRegistry {
    let mut registry = RunnerRegistry::empty();
    registry.register(
        "sh",
        Arc::new(ScriptRunner::new(RunnerConfig {
            image: "local".into(),
            command: vec!["sh".into(), "/code/main.sh".into()],
            file_name: "main.sh".into(),
        })),
    );
    registry
}

pub fn context(
    store: Arc<MemoryStore>,
    registry: RunnerRegistry,
) -> (JobContext, Arc<CountingRuntime>) {
    let runtime = Arc::new(CountingRuntime::default());
    let ctx = JobContext {
        store,
        registry: Arc::new(registry),
        executor: Arc::new(SandboxExecutor::new(
            runtime.clone(),
            ExecutorSettings::default(),
        )),
        retry: fast_retry(),
    };
    (ctx, runtime)
}

pub async fn stored_submission(store: &MemoryStore, language: &str, code: &str) -> Submission {
    let submission = NewSubmission {
        language: language.into(),
        code: code.into(),
        input: String::new(),
        time_limit_ms: 5000,
        memory_limit_mb: 256,
    }
    .into_submission();
    store.save_submission(&submission).await.unwrap();
    submission
}
