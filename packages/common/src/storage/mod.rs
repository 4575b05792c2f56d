mod error;
mod traits;

pub mod memory;
pub mod redis_store;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::{MetadataStore, result_key, submission_key};
