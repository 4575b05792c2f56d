use async_trait::async_trait;
use common::{JobQueue, StorageError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// In-process FIFO queue with the same contract as [`RedisQueue`](crate::RedisQueue).
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, id: &str) -> Result<(), StorageError> {
        self.items.lock().await.push_back(id.to_string());
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<String>, StorageError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking, so an enqueue in between still wakes us.
            let notified = self.available.notified();
            if let Some(id) = self.items.lock().await.pop_front() {
                return Ok(Some(id));
            }
            if wait.is_zero() || tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.items.lock().await.len())
    }
}
