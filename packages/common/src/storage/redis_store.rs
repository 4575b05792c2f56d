use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::error::StorageError;
use super::traits::MetadataStore;

/// Redis-backed metadata store.
///
/// Holds a managed multiplexed connection; clones share the underlying socket,
/// so one store can serve every worker loop in the process. A dropped socket
/// fails the commands in flight and is re-established in the background.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a managed connection from an existing client handle.
    pub async fn connect(client: &redis::Client) -> Result<Self, StorageError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl MetadataStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        // SET .. NX replies OK when written and nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}
