//! Cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache configuration for all backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL applied when a `put` passes no explicit TTL
    pub default_ttl: Option<Duration>,

    /// Maximum number of entries (for the memory backend)
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(3600)),
            max_entries: Some(10_000),
        }
    }
}

impl CacheConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn no_default_ttl(mut self) -> Self {
        self.default_ttl = None;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}
