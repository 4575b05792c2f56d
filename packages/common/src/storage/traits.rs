use async_trait::async_trait;

use super::error::StorageError;
use crate::{ExecutionResult, Submission};

pub fn submission_key(id: &str) -> String {
    format!("submission:{id}")
}

pub fn result_key(id: &str) -> String {
    format!("result:{id}")
}

/// Key-value store holding submissions and results.
///
/// Implementors provide the three string primitives; the typed accessors are
/// built on top of them and share one JSON encoding.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read a raw value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a raw value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Write a raw value only if the key is absent.
    ///
    /// Returns `true` if the value was written.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StorageError>;

    async fn load_submission(&self, id: &str) -> Result<Option<Submission>, StorageError> {
        match self.get(&submission_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_submission(&self, submission: &Submission) -> Result<(), StorageError> {
        let raw = serde_json::to_string(submission)?;
        self.set(&submission_key(&submission.id), &raw).await
    }

    async fn load_result(&self, id: &str) -> Result<Option<ExecutionResult>, StorageError> {
        match self.get(&result_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persist a result unless one already exists for the same id.
    ///
    /// Returns `false` when an earlier result was kept.
    async fn save_result(&self, result: &ExecutionResult) -> Result<bool, StorageError> {
        let raw = serde_json::to_string(result)?;
        self.set_if_absent(&result_key(&result.id), &raw).await
    }
}
