//! ODM configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration for the ODM registry.
///
/// Entity snapshots are invalidated by push, not by expiry, so their TTL
/// is a long safety net. The finder cache is keyed by compiled query and
/// cleared wholesale per model on every save/delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdmConfig {
    /// TTL for cached entity snapshots
    pub entity_cache_ttl: Duration,

    /// Default TTL for cached finder results; finders may override it
    pub finder_cache_ttl: Duration,

    /// Upper bound on entity lock waits; `None` blocks indefinitely
    pub lock_timeout: Option<Duration>,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            entity_cache_ttl: Duration::from_secs(86_400),
            finder_cache_ttl: Duration::from_secs(3600),
            lock_timeout: None,
        }
    }
}

impl OdmConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_finder_cache_ttl(mut self, ttl: Duration) -> Self {
        self.finder_cache_ttl = ttl;
        self
    }
}
