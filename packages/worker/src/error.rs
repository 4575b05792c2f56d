use common::{StatusTransitionError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Status error: {0}")]
    Status(#[from] StatusTransitionError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
