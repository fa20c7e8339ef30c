// TTL / LRU result cache
//
// One mutex guards the whole map and its counters, so check-evict-insert
// sequences are atomic. Compute functions always run outside the lock.

mod events;
mod persistence;
mod predictive;
mod ttl;

pub use events::{CacheEvent, CacheStats};
pub use persistence::CachePersistence;
pub use predictive::{
    AccessPatternAnalyzer, CallParams, Prediction, PredictiveCache, PrefetchLoader, PrefetchStats,
};
pub use ttl::TtlTable;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::domain::{CacheEntry, CacheKey};
use crate::port::{SnapshotEntry, TimeProvider};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

enum Lookup {
    Hit(Value),
    Expired,
    Miss,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheInner {
    state: Mutex<CacheState>,
    max_entries: usize,
    ttl: TtlTable,
    time_provider: Arc<dyn TimeProvider>,
    events: broadcast::Sender<CacheEvent>,
}

/// Memoizes idempotent results for a bounded time.
///
/// `get`/`set` never fail. `get_or_compute` surfaces compute failures
/// unchanged and never caches them. Cheap to clone.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<CacheInner>,
}

impl ResultCache {
    pub fn new(config: &CacheConfig, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_ttl_table(config.max_entries, TtlTable::from_config(config), time_provider)
    }

    pub fn with_ttl_table(
        max_entries: usize,
        ttl: TtlTable,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                max_entries: max_entries.max(1),
                ttl,
                time_provider,
                events,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.inner.time_provider.now_millis()
    }

    fn emit_all(&self, events: Vec<CacheEvent>) {
        for event in events {
            let _ = self.inner.events.send(event);
        }
    }

    /// Fresh value for `key`. Expired entries are removed here, lazily.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = self.now();
        let lookup = {
            let mut state = self.lock();
            let lookup = match state.entries.get_mut(key) {
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(entry) => Lookup::Hit(entry.access(now).clone()),
                None => Lookup::Miss,
            };
            match &lookup {
                Lookup::Hit(_) => state.hits += 1,
                Lookup::Expired => {
                    state.misses += 1;
                    state.entries.remove(key);
                }
                Lookup::Miss => state.misses += 1,
            }
            lookup
        };

        let key_str = key.to_string();
        match lookup {
            Lookup::Hit(value) => {
                debug!(key = %key, "Cache hit");
                self.emit_all(vec![CacheEvent::Hit { key: key_str }]);
                Some(value)
            }
            Lookup::Expired => {
                debug!(key = %key, "Cache entry expired");
                self.emit_all(vec![
                    CacheEvent::Expired {
                        key: key_str.clone(),
                    },
                    CacheEvent::Miss { key: key_str },
                ]);
                None
            }
            Lookup::Miss => {
                debug!(key = %key, "Cache miss");
                self.emit_all(vec![CacheEvent::Miss { key: key_str }]);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`
    pub fn set(&self, key: CacheKey, value: Value, ttl: Duration) {
        self.insert(key, value, ttl, None);
    }

    /// Store with the category's default TTL
    pub fn set_for_category(&self, key: CacheKey, value: Value, category: &str) {
        let ttl = self.inner.ttl.ttl_for(category);
        self.insert(key, value, ttl, Some(category.to_string()));
    }

    fn insert(&self, key: CacheKey, value: Value, ttl: Duration, category: Option<String>) {
        let now = self.now();
        let mut events = {
            let mut state = self.lock();
            let evicted = if state.entries.contains_key(&key) {
                Vec::new()
            } else {
                let overflow = (state.entries.len() + 1).saturating_sub(self.inner.max_entries);
                evict(&mut state, overflow)
            };
            state.evictions += evicted.len() as u64;
            state.entries.insert(
                key.clone(),
                CacheEntry::new(value, ttl, now).with_category(category),
            );
            evicted
                .into_iter()
                .map(|key| CacheEvent::Evicted {
                    key: key.to_string(),
                })
                .collect::<Vec<_>>()
        };
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache stored");
        events.push(CacheEvent::Stored {
            key: key.to_string(),
            ttl_ms: ttl.as_millis() as u64,
        });
        self.emit_all(events);
    }

    /// Return the cached value for `(operation, args, kwargs)` or compute it.
    ///
    /// `ttl = None` uses the TTL of the category named by `operation`. A
    /// failing compute is not cached and its error is returned as is.
    pub fn get_or_compute<F, E>(
        &self,
        operation: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        let key = CacheKey::derive(operation, args, kwargs);
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.store_computed(key, value.clone(), operation, ttl);
        Ok(value)
    }

    /// Async variant of [`ResultCache::get_or_compute`]
    pub async fn get_or_compute_async<F, Fut, E>(
        &self,
        operation: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let key = CacheKey::derive(operation, args, kwargs);
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute().await?;
        self.store_computed(key, value.clone(), operation, ttl);
        Ok(value)
    }

    fn store_computed(&self, key: CacheKey, value: Value, operation: &str, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.inner.ttl.ttl_for(operation));
        self.insert(key, value, ttl, Some(operation.to_string()));
    }

    /// Remove every key whose readable part contains `pattern`.
    /// Digests of derived keys are not searched.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let count = {
            let mut state = self.lock();
            let before = state.entries.len();
            state.entries.retain(|key, _| !key.readable().contains(pattern));
            before - state.entries.len()
        };
        info!(pattern = %pattern, count, "Cache invalidated");
        self.emit_all(vec![CacheEvent::Invalidated {
            pattern: pattern.to_string(),
            count,
        }]);
        count
    }

    /// Remove everything
    pub fn invalidate_all(&self) -> usize {
        let count = {
            let mut state = self.lock();
            let count = state.entries.len();
            state.entries.clear();
            count
        };
        info!(count, "Cache cleared");
        self.emit_all(vec![CacheEvent::Cleared { count }]);
        count
    }

    /// Sweep all expired entries; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.now();
        let expired: Vec<CacheKey> = {
            let mut state = self.lock();
            let expired: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                state.entries.remove(key);
            }
            expired
        };
        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired cache entries removed");
        }
        let count = expired.len();
        self.emit_all(
            expired
                .into_iter()
                .map(|key| CacheEvent::Expired {
                    key: key.to_string(),
                })
                .collect(),
        );
        count
    }

    /// Present and fresh; does not touch counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.now();
        self.lock()
            .entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    pub fn ttl_table(&self) -> &TtlTable {
        &self.inner.ttl
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let mut ttl_distribution = BTreeMap::new();
        for entry in state.entries.values() {
            let bucket = format!("{:.0}s", entry.ttl.as_secs_f64());
            *ttl_distribution.entry(bucket).or_insert(0) += 1;
        }

        CacheStats {
            hits: state.hits,
            misses: state.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64 * 100.0
            },
            evictions: state.evictions,
            size: state.entries.len(),
            max_entries: self.inner.max_entries,
            ttl_distribution,
        }
    }

    pub fn reset_stats(&self) {
        let mut state = self.lock();
        state.hits = 0;
        state.misses = 0;
        state.evictions = 0;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Serializable copy of every stored entry
    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        self.lock()
            .entries
            .iter()
            .map(|(key, entry)| SnapshotEntry {
                key: key.to_string(),
                value: entry.value.clone(),
                created_at_ms: entry.created_at_ms,
                ttl_ms: entry.ttl_ms(),
                access_count: entry.access_count,
                last_access_ms: entry.last_access_ms,
                category: entry.category.clone(),
            })
            .collect()
    }

    /// Load snapshot entries, re-deriving the TTL of known categories from
    /// the current table. Entries already expired are discarded, and only
    /// the newest `max_entries` are kept. Returns how many were loaded.
    pub fn restore(&self, entries: Vec<SnapshotEntry>) -> usize {
        let now = self.now();
        let mut fresh: Vec<(CacheKey, CacheEntry)> = entries
            .into_iter()
            .map(|snap| {
                let ttl = match &snap.category {
                    Some(category) if self.inner.ttl.contains(category) => {
                        self.inner.ttl.ttl_for(category)
                    }
                    _ => Duration::from_millis(snap.ttl_ms.max(0) as u64),
                };
                let entry = CacheEntry {
                    value: snap.value,
                    created_at_ms: snap.created_at_ms,
                    ttl,
                    access_count: snap.access_count,
                    last_access_ms: snap.last_access_ms,
                    category: snap.category,
                };
                (CacheKey::from(snap.key), entry)
            })
            .filter(|(_, entry)| !entry.is_expired(now))
            .collect();
        fresh.sort_by(|a, b| b.1.created_at_ms.cmp(&a.1.created_at_ms));

        let mut state = self.lock();
        let room = self.inner.max_entries.saturating_sub(state.entries.len());
        let mut loaded = 0;
        for (key, entry) in fresh.into_iter().take(room) {
            if state.entries.insert(key, entry).is_none() {
                loaded += 1;
            }
        }
        loaded
    }
}

/// Remove `count` entries: fewest accesses first, oldest first among equals
fn evict(state: &mut CacheState, count: usize) -> Vec<CacheKey> {
    if count == 0 {
        return Vec::new();
    }
    let mut candidates: Vec<(&CacheKey, u64, i64)> = state
        .entries
        .iter()
        .map(|(key, entry)| (key, entry.access_count, entry.created_at_ms))
        .collect();
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
    let victims: Vec<CacheKey> = candidates
        .into_iter()
        .take(count)
        .map(|(key, _, _)| key.clone())
        .collect();
    for key in &victims {
        state.entries.remove(key);
    }
    victims
}
