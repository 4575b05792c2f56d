use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use common::RedisConfig;
use common::retry::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::executor::FailurePolicy;

/// How a worker loop waits for the next submission id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DequeueMode {
    /// Block on the queue with a bounded timeout.
    #[default]
    Blocking,
    /// Pop without waiting and back off exponentially while empty.
    Polling,
}

/// Worker loop configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    /// Identifier used in logs. Default: "worker-1".
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Number of job loops run by this process. Default: 1.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub dequeue_mode: DequeueMode,
    /// Longest single blocking pop, in milliseconds. Default: 5000.
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,
    /// First polling delay after an empty pop. Default: 100ms.
    #[serde(default = "default_poll_base_delay_ms")]
    pub poll_base_delay_ms: u64,
    /// Cap on the polling delay. Default: 5000ms.
    #[serde(default = "default_poll_max_delay_ms")]
    pub poll_max_delay_ms: u64,
    /// Consecutive queue failures before the instance reports unhealthy. Default: 5.
    #[serde(default = "default_unhealthy_after")]
    pub unhealthy_after: u32,
    /// Retry bounds for store operations inside a job.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_worker_id() -> String {
    "worker-1".into()
}
fn default_concurrency() -> usize {
    1
}
fn default_block_timeout_ms() -> u64 {
    5000
}
fn default_poll_base_delay_ms() -> u64 {
    100
}
fn default_poll_max_delay_ms() -> u64 {
    5000
}
fn default_unhealthy_after() -> u32 {
    5
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            concurrency: default_concurrency(),
            dequeue_mode: DequeueMode::default(),
            block_timeout_ms: default_block_timeout_ms(),
            poll_base_delay_ms: default_poll_base_delay_ms(),
            poll_max_delay_ms: default_poll_max_delay_ms(),
            unhealthy_after: default_unhealthy_after(),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerSettings {
    /// Wait passed to each dequeue call.
    pub fn dequeue_wait(&self) -> Duration {
        match self.dequeue_mode {
            DequeueMode::Blocking => Duration::from_millis(self.block_timeout_ms.max(1)),
            DequeueMode::Polling => Duration::ZERO,
        }
    }
}

/// Isolation backend used to run submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Docker,
    /// Plain host processes. No isolation; local development only.
    Process,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxSettings {
    #[serde(default)]
    pub runtime: RuntimeKind,
    /// Docker executable path. Default: "docker".
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    /// Fractional CPU cap per container. Default: 0.5.
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    /// Process-count cap per container. Default: 64.
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u32,
    /// Where the source directory is mounted inside the container. Default: "/code".
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    /// Extra wall-clock allowance for container start-up. Default: 0.
    #[serde(default)]
    pub launch_grace_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Parent directory for per-run scratch directories. Default: system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Bytes of stdout and of stderr kept per run. Default: 8 MiB each.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: u64,
}

fn default_docker_bin() -> String {
    "docker".into()
}
fn default_cpus() -> f64 {
    0.5
}
fn default_pids_limit() -> u32 {
    64
}
fn default_mount_point() -> String {
    "/code".into()
}
fn default_output_limit_bytes() -> u64 {
    8 * 1024 * 1024
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::default(),
            docker_bin: default_docker_bin(),
            cpus: default_cpus(),
            pids_limit: default_pids_limit(),
            mount_point: default_mount_point(),
            launch_grace_ms: 0,
            failure_policy: FailurePolicy::default(),
            scratch_dir: None,
            output_limit_bytes: default_output_limit_bytes(),
        }
    }
}

/// An extra language runner declared in configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LanguageSettings {
    pub image: String,
    /// Argv executed inside the sandbox.
    pub command: Vec<String>,
    /// Name the source is written under. Default: "main".
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_file_name() -> String {
    "main".into()
}

/// Worker application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub languages: HashMap<String, LanguageSettings>,
}

impl WorkerAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CODEBOX_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("redis.queue_name", "queue:submissions")?
            .set_default("worker.id", "worker-1")?
            .set_default("worker.concurrency", 1_i64)?
            .set_default("sandbox.runtime", "docker")?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("CODEBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
