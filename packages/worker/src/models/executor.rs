use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use common::{ExecutionResult, SubmissionLimits, SystemErrorInfo, Verdict};
use serde::Deserialize;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::sandbox::error::SandboxError;
use super::sandbox::{Invocation, RunnerConfig, SandboxRuntime};
use crate::config::SandboxSettings;

/// Which completed runs count as `Runtime Error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any output on stderr, regardless of exit status.
    #[default]
    Stderr,
    /// Output on stderr or a non-zero exit status.
    StderrOrExitCode,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Added to the submission's time limit to absorb environment start-up.
    pub launch_grace: Duration,
    pub failure_policy: FailurePolicy,
    /// Parent of per-run scratch directories; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Bytes kept per output stream; the rest is read and discarded.
    pub output_limit_bytes: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            launch_grace: Duration::ZERO,
            failure_policy: FailurePolicy::default(),
            scratch_dir: None,
            output_limit_bytes: SandboxSettings::default().output_limit_bytes,
        }
    }
}

impl From<&SandboxSettings> for ExecutorSettings {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            launch_grace: Duration::from_millis(settings.launch_grace_ms),
            failure_policy: settings.failure_policy,
            scratch_dir: settings.scratch_dir.clone(),
            output_limit_bytes: settings.output_limit_bytes,
        }
    }
}

/// Classified result of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Accepted { stdout: String },
    RuntimeError { stdout: String, stderr: String },
    /// Output is discarded when the deadline fires.
    TimeLimitExceeded,
    /// The environment could not be provisioned.
    InternalError(SystemErrorInfo),
}

impl ExecutionOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Accepted { .. } => Verdict::Accepted,
            Self::RuntimeError { .. } => Verdict::RuntimeError,
            Self::TimeLimitExceeded => Verdict::TimeLimitExceeded,
            Self::InternalError(_) => Verdict::InternalError,
        }
    }

    pub fn into_result(self, id: &str) -> ExecutionResult {
        match self {
            Self::Accepted { stdout } => {
                ExecutionResult::new(id, Verdict::Accepted, stdout, String::new())
            }
            Self::RuntimeError { stdout, stderr } => {
                ExecutionResult::new(id, Verdict::RuntimeError, stdout, stderr)
            }
            Self::TimeLimitExceeded => ExecutionResult::new(
                id,
                Verdict::TimeLimitExceeded,
                String::new(),
                String::new(),
            ),
            Self::InternalError(info) => ExecutionResult::internal_error(id, info),
        }
    }
}

impl From<SandboxError> for ExecutionOutcome {
    fn from(err: SandboxError) -> Self {
        Self::InternalError(SystemErrorInfo::new(err.code(), err.to_string()))
    }
}

/// Read a pipe to the end, keeping at most `limit` bytes.
///
/// The remainder is drained so the writer never blocks on a full pipe. The
/// flag reports whether anything was dropped.
async fn read_capped<R>(pipe: Option<R>, limit: u64) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok((Vec::new(), false));
    };
    let mut kept = Vec::new();
    (&mut pipe).take(limit).read_to_end(&mut kept).await?;
    let dropped = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    Ok((kept, dropped > 0))
}

/// Runs one piece of code in a fresh, resource-capped environment.
pub struct SandboxExecutor {
    runtime: Arc<dyn SandboxRuntime>,
    settings: ExecutorSettings,
}

impl SandboxExecutor {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, settings: ExecutorSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Run `code` with `input` on stdin and classify the outcome.
    ///
    /// Never fails: provisioning problems come back as
    /// [`ExecutionOutcome::InternalError`].
    #[instrument(skip_all, fields(runtime = self.runtime.name(), image = %runner.image))]
    pub async fn execute(
        &self,
        code: &str,
        input: &str,
        limits: SubmissionLimits,
        runner: &RunnerConfig,
    ) -> ExecutionOutcome {
        match self.run(code, input, limits, runner).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        }
    }

    async fn run(
        &self,
        code: &str,
        input: &str,
        limits: SubmissionLimits,
        runner: &RunnerConfig,
    ) -> Result<ExecutionOutcome, SandboxError> {
        // Dropped on every return path, including the timeout branch and unwinding.
        let workdir = self.materialize(code, &runner.file_name).await?;

        let invocation = Invocation {
            name: format!("codebox-{}", Uuid::new_v4()),
            workdir: workdir.path().to_path_buf(),
            runner: runner.clone(),
            memory_limit_mb: limits.memory_limit_mb,
        };

        let mut command = self.runtime.command(&invocation)?;
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            SandboxError::Launch(format!("failed to start {}: {e}", self.runtime.name()))
        })?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            let input = input.as_bytes().to_vec();
            tokio::spawn(async move {
                // The program may exit without reading; a broken pipe is expected then.
                let _ = stdin.write_all(&input).await;
            });
        }

        let limit = self.settings.output_limit_bytes;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            let ((stdout, stdout_cut), (stderr, stderr_cut), status) = tokio::try_join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                child.wait()
            )?;
            if stdout_cut || stderr_cut {
                warn!(
                    name = %invocation.name,
                    limit,
                    stdout_cut,
                    stderr_cut,
                    "Output exceeded limit, truncated"
                );
            }
            Ok::<_, std::io::Error>(Output {
                status,
                stdout,
                stderr,
            })
        };

        let deadline = Duration::from_millis(limits.time_limit_ms) + self.settings.launch_grace;
        let waited = tokio::time::timeout(deadline, collect).await;
        let output = match waited {
            Ok(output) => output.map_err(|e| {
                SandboxError::Execution(format!("failed to collect output: {e}"))
            })?,
            Err(_) => {
                let _ = child.start_kill();
                self.runtime.terminate(&invocation, pid).await;
                debug!(
                    name = %invocation.name,
                    deadline_ms = deadline.as_millis() as u64,
                    "Deadline exceeded"
                );
                return Ok(ExecutionOutcome::TimeLimitExceeded);
            }
        };

        if self.runtime.is_launch_failure(&output.status) {
            return Err(SandboxError::Launch(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(self.classify(output))
    }

    async fn materialize(&self, code: &str, file_name: &str) -> Result<TempDir, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codebox-");
        let dir = match &self.settings.scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| SandboxError::Launch(format!("failed to create work directory: {e}")))?;

        let source = dir.path().join(file_name);
        tokio::fs::write(&source, code)
            .await
            .map_err(|e| SandboxError::Launch(format!("failed to write source: {e}")))?;

        // Containers run with every capability dropped, so the mount must be
        // world-readable even when the worker's uid differs from the container's.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permission_error =
                |e: std::io::Error| SandboxError::Launch(format!("failed to set permissions: {e}"));
            tokio::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(permission_error)?;
            tokio::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(permission_error)?;
        }

        Ok(dir)
    }

    fn classify(&self, output: Output) -> ExecutionOutcome {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let failed = !stderr.is_empty()
            || (self.settings.failure_policy == FailurePolicy::StderrOrExitCode
                && !output.status.success());

        if failed {
            debug!(code = ?output.status.code(), "Program failed");
            ExecutionOutcome::RuntimeError { stdout, stderr }
        } else {
            ExecutionOutcome::Accepted { stdout }
        }
    }
}
