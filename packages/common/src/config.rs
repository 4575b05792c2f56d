use serde::Deserialize;

/// Connection settings shared by the store and the job queue.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Name of the list carrying submission ids. Default: "queue:submissions".
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".into()
}
fn default_queue_name() -> String {
    "queue:submissions".into()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            queue_name: default_queue_name(),
        }
    }
}

impl RedisConfig {
    /// Build the client handle every connection in the process is derived from.
    pub fn client(&self) -> Result<redis::Client, crate::StorageError> {
        redis::Client::open(self.url.as_str()).map_err(crate::StorageError::from)
    }
}
