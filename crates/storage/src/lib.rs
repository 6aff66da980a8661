#![forbid(unsafe_code)]

pub mod cache;
pub mod repository;
pub mod sqlite;

pub use cache::{CacheError, FastCache, InMemoryCache, RedisCache};
pub use repository::{Storage, StorageError};
