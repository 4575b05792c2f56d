use super::error::SandboxError;
use super::{Invocation, SandboxRuntime};
use crate::config::SandboxSettings;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// `docker run` exits with this code when the daemon could not create or start the container.
const DOCKER_LAUNCH_FAILURE: i32 = 125;

/// Pause before the second removal pass after a timeout.
const FOLLOW_UP_REMOVAL_DELAY: Duration = Duration::from_secs(1);

/// Runs each submission in a throwaway container through the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker_bin: String,
    cpus: f64,
    pids_limit: u32,
    mount_point: String,
}

impl DockerRuntime {
    pub fn new(settings: &SandboxSettings) -> Self {
        Self {
            docker_bin: settings.docker_bin.clone(),
            cpus: settings.cpus,
            pids_limit: settings.pids_limit,
            mount_point: settings.mount_point.clone(),
        }
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn command(&self, invocation: &Invocation) -> Result<Command, SandboxError> {
        if invocation.runner.command.is_empty() {
            return Err(SandboxError::Launch(format!(
                "runner for image {} has an empty command",
                invocation.runner.image
            )));
        }

        let memory = format!("{}m", invocation.memory_limit_mb);
        let mut command = Command::new(&self.docker_bin);
        command
            .arg("run")
            .arg("--rm")
            .arg("-i")
            .arg(format!("--name={}", invocation.name))
            .arg("--network=none")
            .arg(format!("--memory={memory}"))
            .arg(format!("--memory-swap={memory}"))
            .arg(format!("--cpus={}", self.cpus))
            .arg(format!("--pids-limit={}", self.pids_limit))
            .arg("--cap-drop=ALL")
            .arg("--security-opt=no-new-privileges")
            .arg(format!(
                "--volume={}:{}:ro",
                invocation.workdir.display(),
                self.mount_point
            ))
            .arg(format!("--workdir={}", self.mount_point))
            .arg(&invocation.runner.image)
            .args(&invocation.runner.command);

        Ok(command)
    }

    fn is_launch_failure(&self, status: &ExitStatus) -> bool {
        status.code() == Some(DOCKER_LAUNCH_FAILURE)
    }

    async fn terminate(&self, invocation: &Invocation, _pid: Option<u32>) {
        // Killing the client does not stop the container; remove it by name.
        remove_container(&self.docker_bin, &invocation.name).await;

        // A create still in flight at the deadline yields a container that
        // never starts, which --rm does not clean up. Sweep once more later.
        let docker_bin = self.docker_bin.clone();
        let name = invocation.name.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FOLLOW_UP_REMOVAL_DELAY).await;
            remove_container(&docker_bin, &name).await;
        });
    }
}

async fn remove_container(docker_bin: &str, name: &str) {
    let removed = Command::new(docker_bin)
        .arg("rm")
        .arg("-f")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match removed {
        Ok(status) if status.success() => {
            debug!(container = %name, "Removed timed-out container");
        }
        Ok(status) => {
            debug!(container = %name, code = ?status.code(), "docker rm -f found nothing to remove");
        }
        Err(e) => {
            warn!(container = %name, error = %e, "Failed to run docker rm -f");
        }
    }
}
