use async_trait::async_trait;
use std::time::Duration;

use crate::storage::StorageError;

/// Ordered handoff of submission ids from producers to workers.
///
/// Only identifiers travel through the queue; payloads live in the
/// [`MetadataStore`](crate::MetadataStore).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an id to the tail of the queue.
    async fn enqueue(&self, id: &str) -> Result<(), StorageError>;

    /// Atomically remove and return the id at the head.
    ///
    /// Waits up to `wait` for an id to arrive; `Duration::ZERO` returns
    /// immediately. `Ok(None)` means the queue was empty, which is not an error.
    async fn dequeue(&self, wait: Duration) -> Result<Option<String>, StorageError>;

    /// Number of ids currently waiting.
    async fn len(&self) -> Result<usize, StorageError>;

    async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }
}
