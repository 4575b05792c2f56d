//! Host-process runtime for local development.
//!
//! Provides no filesystem or network isolation. The memory limit is applied as
//! an `RLIMIT_DATA` cap and the whole process group is killed on timeout.

use super::error::SandboxError;
use super::{Invocation, SandboxRuntime};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    mount_point: String,
}

impl ProcessRuntime {
    /// `mount_point` is the in-sandbox source path that runner commands refer to;
    /// it is rewritten to the host work directory.
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
        }
    }

    fn localize(&self, arg: &str, workdir: &Path) -> OsString {
        match arg.strip_prefix(self.mount_point.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                workdir.join(rest.trim_start_matches('/')).into_os_string()
            }
            _ => OsString::from(arg),
        }
    }
}

fn set_data_limit(bytes: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    // SAFETY: setrlimit only reads the struct passed by reference.
    if unsafe { libc::setrlimit(libc::RLIMIT_DATA, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[async_trait]
impl SandboxRuntime for ProcessRuntime {
    fn name(&self) -> &'static str {
        "process"
    }

    fn command(&self, invocation: &Invocation) -> Result<Command, SandboxError> {
        let (program, args) = invocation.runner.command.split_first().ok_or_else(|| {
            SandboxError::Launch(format!(
                "runner for image {} has an empty command",
                invocation.runner.image
            ))
        })?;

        let workdir = invocation.workdir.as_path();
        let mut command = Command::new(self.localize(program, workdir));
        command
            .args(args.iter().map(|arg| self.localize(arg, workdir)))
            .current_dir(workdir)
            .env_clear()
            .process_group(0);

        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let data_limit = invocation.memory_limit_mb.saturating_mul(1024 * 1024);
        // SAFETY: the hook runs between fork and exec and only calls setrlimit,
        // which is async-signal-safe.
        unsafe {
            command.pre_exec(move || set_data_limit(data_limit));
        }

        Ok(command)
    }

    async fn terminate(&self, invocation: &Invocation, pid: Option<u32>) {
        let Some(pid) = pid else {
            return;
        };
        // The child leads its own group, so this also reaches anything it forked.
        // SAFETY: killpg takes plain integers and touches no memory of ours. The
        // group id is still reserved because the child has not been reaped yet.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        debug!(name = %invocation.name, pid, rc, "Killed process group");
    }
}
