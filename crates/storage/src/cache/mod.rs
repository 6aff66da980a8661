//! Fast Cache: an ephemeral key-value accelerator with per-key TTL.
//!
//! Nothing stored here is authoritative. Callers treat every error as a cache
//! miss on read and as a logged no-op on write.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait FastCache: Send + Sync {
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the backend cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value and TTL.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the backend cannot be reached.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the backend cannot be reached.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
