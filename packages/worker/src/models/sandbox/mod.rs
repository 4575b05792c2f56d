pub mod docker;
pub mod error;
pub mod process;

use async_trait::async_trait;
use error::SandboxError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::Command;

pub use docker::DockerRuntime;
pub use process::ProcessRuntime;

/// Where and how a language's source runs inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Container image providing the interpreter.
    pub image: String,
    /// Argv executed inside the sandbox, with paths under the mount point.
    pub command: Vec<String>,
    /// Name the source is materialized under.
    pub file_name: String,
}

/// One launch of a submission.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Unique per launch; used as the container name.
    pub name: String,
    /// Host directory holding the materialized source.
    pub workdir: PathBuf,
    pub runner: RunnerConfig,
    pub memory_limit_mb: u64,
}

/// An isolation backend.
///
/// The runtime only builds and tears down the environment. Stdio wiring, the
/// deadline, and classification belong to the executor.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the command that runs `invocation` under the runtime's limits.
    fn command(&self, invocation: &Invocation) -> Result<Command, SandboxError>;

    /// Whether `status` means the runtime failed before the program started.
    fn is_launch_failure(&self, _status: &ExitStatus) -> bool {
        false
    }

    /// Forcibly stop anything `invocation` left behind after a timeout.
    ///
    /// `pid` is the client process the executor spawned, if it was known.
    async fn terminate(&self, invocation: &Invocation, pid: Option<u32>);
}
