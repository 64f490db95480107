//! In-memory cache backend with TTL expiry

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::{CacheBackend, CacheConfig, CacheResult};

/// Entry in the memory cache
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    created_at: Instant,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Instant::now() > exp)
    }
}

/// Thread-safe in-memory backend.
///
/// Expired entries are dropped lazily on access and eagerly by
/// [`MemoryBackend::purge_expired`]. When `max_entries` is reached the
/// oldest entry is evicted to make room.
pub struct MemoryBackend {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
}

impl MemoryBackend {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().created_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            debug!(%key, "evicted oldest cache entry");
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry);
                self.entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if let Some(max) = self.config.max_entries {
            if self.entries.len() >= max && !self.entries.contains_key(key) {
                self.purge_expired();
                if self.entries.len() >= max {
                    self.evict_oldest();
                }
            }
        }

        let ttl = ttl.or(self.config.default_ttl);
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));

        Ok(())
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry);
                self.entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> CacheResult<usize> {
        Ok(self.entries.iter().filter(|e| !e.value().is_expired()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(CacheConfig::default().no_default_ttl())
    }

    #[test]
    fn put_get_forget() {
        let cache = backend();
        cache.put("a", b"1".to_vec(), None).unwrap();

        assert_eq!(cache.get("a").unwrap(), Some(b"1".to_vec()));
        assert!(cache.exists("a").unwrap());
        assert!(cache.forget("a").unwrap());
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = backend();
        cache
            .put("a", b"1".to_vec(), Some(Duration::from_nanos(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get("a").unwrap(), None);
        assert!(!cache.exists("a").unwrap());
    }

    #[test]
    fn purge_removes_only_expired() {
        let cache = backend();
        cache
            .put("dead", b"1".to_vec(), Some(Duration::from_nanos(1)))
            .unwrap();
        cache.put("live", b"2".to_vec(), None).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get("live").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = MemoryBackend::new(CacheConfig::default().no_default_ttl().with_max_entries(2));
        cache.put("a", b"1".to_vec(), None).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.put("b", b"2".to_vec(), None).unwrap();
        cache.put("c", b"3".to_vec(), None).unwrap();

        assert_eq!(cache.get("a").unwrap(), None);
        assert!(cache.exists("b").unwrap());
        assert!(cache.exists("c").unwrap());
    }

    #[test]
    fn flush_clears_everything() {
        let cache = backend();
        cache.put("a", b"1".to_vec(), None).unwrap();
        cache.put("b", b"2".to_vec(), None).unwrap();

        cache.flush().unwrap();
        assert!(cache.is_empty().unwrap());
    }
}
