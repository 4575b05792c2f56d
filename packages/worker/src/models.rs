pub mod executor;
pub mod language;
pub mod sandbox;
pub mod worker;

pub use executor::{ExecutionOutcome, ExecutorSettings, FailurePolicy, SandboxExecutor};
pub use language::{LanguageRunner, RunnerRegistry, ScriptRunner};
pub use worker::{Cycle, Health, Worker};
