use async_trait::async_trait;
use common::{JobQueue, StorageError};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;

/// Job queue backed by a single Redis list.
///
/// Ids are pushed on the left and popped from the right, so the list reads
/// oldest-last and delivery is FIFO for a single producer. `RPOP`/`BRPOP` are
/// atomic, so each id reaches at most one consumer.
///
/// A blocking pop occupies its connection until it returns; give every
/// consuming loop its own queue instead of sharing one. The connection is
/// re-established after a drop, so a failed call can simply be retried.
pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }

    /// Open a dedicated connection for this queue from a shared client handle.
    ///
    /// The connection carries no response timeout, since a `BRPOP` legitimately
    /// stays unanswered for the whole wait.
    pub async fn connect(
        client: &redis::Client,
        key: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let config = ConnectionManagerConfig::new().set_response_timeout(None);
        let conn = ConnectionManager::new_with_config(client.clone(), config).await?;
        Ok(Self::new(conn, key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, id: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _len: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();

        if wait.is_zero() {
            let id: Option<String> = redis::cmd("RPOP")
                .arg(&self.key)
                .query_async(&mut conn)
                .await?;
            return Ok(id);
        }

        // BRPOP replies with [key, value], or nil once the timeout elapses.
        // A zero timeout would block forever, hence the RPOP branch above.
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, id)| id))
    }

    async fn len(&self) -> Result<usize, StorageError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}
