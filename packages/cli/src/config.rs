use common::RedisConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// The CLI only needs to reach the store and the queue.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub redis: RedisConfig,
}

impl CliConfig {
    /// Reads the same file and `CODEBOX__*` variables as the worker.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CODEBOX_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        Config::builder()
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("redis.queue_name", "queue:submissions")?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("CODEBOX").separator("__"))
            .build()?
            .try_deserialize()
    }
}
