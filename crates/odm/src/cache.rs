//! Entity snapshot cache
//!
//! Field data of stored entities is kept in a process-wide pool so that
//! concurrent holders of the same entity observe each other's committed
//! mutations. A snapshot carries the modified flag alongside the data:
//! a holder that pulls a dirty snapshot must also inherit the obligation
//! to save it.
//!
//! Cache failures degrade to misses. The store remains the source of
//! truth, so a broken cache costs a reload, not correctness.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use sitekit_cache::{Cache, CacheBackend};

use crate::value::{Document, ObjectId};

/// Cached field data of one stored entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: Document,
    pub modified: bool,
}

pub struct EntityCache {
    pool: Cache<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl EntityCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        EntityCache { pool: Cache::new(backend), ttl }
    }

    fn key(model: &str, id: &ObjectId) -> String {
        format!("{model}:{id}")
    }

    pub fn has(&self, model: &str, id: &ObjectId) -> bool {
        self.pool.exists(&Self::key(model, id)).unwrap_or(false)
    }

    pub fn get(&self, model: &str, id: &ObjectId) -> Option<Snapshot> {
        let key = Self::key(model, id);
        match self.pool.get(&key) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%key, %err, "entity cache read failed, treating as miss");
                None
            }
        }
    }

    pub fn put(&self, model: &str, id: &ObjectId, snapshot: &Snapshot) {
        let key = Self::key(model, id);
        if let Err(err) = self.pool.put(&key, snapshot, Some(self.ttl)) {
            warn!(%key, %err, "entity cache write failed");
        }
    }

    pub fn rm(&self, model: &str, id: &ObjectId) {
        let key = Self::key(model, id);
        if let Err(err) = self.pool.forget(&key) {
            warn!(%key, %err, "entity cache removal failed");
        }
    }

    pub fn flush(&self) {
        if let Err(err) = self.pool.flush() {
            warn!(%err, "entity cache flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use sitekit_cache::{CacheConfig, MemoryBackend};

    fn cache() -> EntityCache {
        EntityCache::new(
            Arc::new(MemoryBackend::new(CacheConfig::default())),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn snapshot_roundtrip() {
        let cache = cache();
        let id = ObjectId::new();

        let mut data = Document::new();
        data.insert("title".to_string(), Value::from("hello"));
        let snapshot = Snapshot { data, modified: true };

        cache.put("note", &id, &snapshot);
        assert!(cache.has("note", &id));

        let back = cache.get("note", &id).unwrap();
        assert!(back.modified);
        assert_eq!(back.data.get("title"), Some(&Value::from("hello")));

        cache.rm("note", &id);
        assert!(!cache.has("note", &id));
    }

    #[test]
    fn models_do_not_collide() {
        let cache = cache();
        let id = ObjectId::new();
        cache.put("note", &id, &Snapshot { data: Document::new(), modified: false });
        assert!(!cache.has("page", &id));
    }
}
