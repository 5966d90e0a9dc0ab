//! Store error types

/// Error type for key-value store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(feature = "redis")]
impl From<bb8::RunError<::redis::RedisError>> for StoreError {
    fn from(value: bb8::RunError<::redis::RedisError>) -> Self {
        match value {
            bb8::RunError::User(e) => StoreError::Redis(e),
            bb8::RunError::TimedOut => StoreError::PoolTimeout,
        }
    }
}
