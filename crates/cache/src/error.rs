use thiserror::Error;

/// Errors that can occur when talking to the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not serve the request.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A cached entry could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
