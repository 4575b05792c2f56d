use std::fmt;

/// Errors raised by the metadata store and the job queue backing store.
#[derive(Debug)]
pub enum StorageError {
    /// The backing store was unreachable or rejected the command.
    Backend(String),
    /// A stored record could not be encoded or decoded.
    Serialization(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "storage backend error: {msg}"),
            Self::Serialization(err) => write!(f, "malformed stored record: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            Self::Backend(_) => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}
