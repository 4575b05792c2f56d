pub mod config;
pub mod error;
pub mod handlers;
pub mod models;

#[cfg(test)]
mod test_support;

pub use config::{DequeueMode, RuntimeKind, SandboxSettings, WorkerAppConfig, WorkerSettings};
pub use error::{Result, WorkerError};
pub use handlers::job::{JobContext, JobOutcome, handle_job};
pub use models::{
    Cycle, ExecutionOutcome, ExecutorSettings, Health, LanguageRunner, RunnerRegistry,
    SandboxExecutor, ScriptRunner, Worker,
};
