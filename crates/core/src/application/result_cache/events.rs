// Cache notifications and statistics

use serde::Serialize;
use std::collections::BTreeMap;

/// Notifications published by the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Hit { key: String },
    Miss { key: String },
    Stored { key: String, ttl_ms: u64 },
    Evicted { key: String },
    Expired { key: String },
    Invalidated { pattern: String, count: usize },
    Cleared { count: usize },
}

impl CacheEvent {
    /// Whether the event changed the stored entries
    pub fn is_mutation(&self) -> bool {
        !matches!(self, CacheEvent::Hit { .. } | CacheEvent::Miss { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups that hit (0 when there were none)
    pub hit_rate: f64,
    pub evictions: u64,
    pub size: usize,
    pub max_entries: usize,
    /// Entry count per TTL bucket, labelled like `"30s"`
    pub ttl_distribution: BTreeMap<String, usize>,
}
