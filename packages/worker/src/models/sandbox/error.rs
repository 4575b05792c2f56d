use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    /// The isolated environment could not be provisioned.
    #[error("sandbox launch failed: {0}")]
    Launch(String),

    #[error("execution error: {0}")]
    Execution(String),
}

impl SandboxError {
    pub const LAUNCH_CODE: &'static str = "SANDBOX_LAUNCH";
    pub const EXECUTION_CODE: &'static str = "SANDBOX_EXECUTION";

    /// Machine-readable code recorded in `error_info`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Launch(_) => Self::LAUNCH_CODE,
            Self::Execution(_) => Self::EXECUTION_CODE,
        }
    }

    /// Operator-facing summary for a recorded code.
    pub fn summary(code: &str) -> &'static str {
        match code {
            Self::LAUNCH_CODE => "Sandbox could not be provisioned",
            Self::EXECUTION_CODE => "Sandbox output could not be collected",
            _ => "Sandbox failed",
        }
    }
}
