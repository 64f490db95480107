//! # sitekit-cache
//!
//! Process-wide cache pools for the sitekit framework.
//!
//! A pool is a named key-value namespace over a shared [`CacheBackend`].
//! Backends store raw bytes with an optional TTL; the typed [`Cache`]
//! wrapper adds serde serialization on top. All operations are
//! synchronous and safe to call from multiple threads.
//!
//! ```
//! use sitekit_cache::{Cache, CacheConfig, MemoryBackend};
//! use std::time::Duration;
//!
//! let cache = Cache::new(MemoryBackend::new(CacheConfig::default()));
//! cache.put("user:123", &"John Doe".to_string(), Some(Duration::from_secs(3600))).unwrap();
//! let user: Option<String> = cache.get("user:123").unwrap();
//! assert_eq!(user, Some("John Doe".to_string()));
//! ```

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Core cache backend trait that all cache implementations must implement
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Put a value in the cache with optional TTL
    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a value from the cache; returns whether the key existed
    fn forget(&self, key: &str) -> CacheResult<bool>;

    /// Check if a key exists in the cache
    fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Clear all entries from the cache
    fn flush(&self) -> CacheResult<()>;

    /// Number of live entries
    fn len(&self) -> CacheResult<usize>;

    /// Whether the cache holds no live entries
    fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Shared backends work anywhere an owned backend does
impl<T: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<T> {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        (**self).put(key, value, ttl)
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        (**self).forget(key)
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key)
    }

    fn flush(&self) -> CacheResult<()> {
        (**self).flush()
    }

    fn len(&self) -> CacheResult<usize> {
        (**self).len()
    }
}

/// Typed cache front-end over a byte-level backend.
///
/// Values are serialized with serde_json. A deserialization failure on
/// `get` is reported as an error, not silently treated as a miss.
pub struct Cache<B: CacheBackend> {
    backend: B,
}

impl<B: CacheBackend> Cache<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get a typed value; `None` on miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a typed value; `KeyNotFound` on miss.
    pub fn get_or_err<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        self.get(key)?
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))
    }

    /// Store a typed value with an optional TTL.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes, ttl)
    }

    /// Remove a key; returns whether it existed.
    pub fn forget(&self, key: &str) -> CacheResult<bool> {
        self.backend.forget(key)
    }

    pub fn exists(&self, key: &str) -> CacheResult<bool> {
        self.backend.exists(key)
    }

    /// Drop every entry in the pool.
    pub fn flush(&self) -> CacheResult<()> {
        self.backend.flush()
    }

    pub fn len(&self) -> CacheResult<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        self.backend.is_empty()
    }
}
