// Cache key derivation and cache entries

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Hex length of a SHA-256 digest
const DIGEST_HEX_LEN: usize = 64;

/// Deterministic cache key: `"{operation}:{sha256 hex}"`.
///
/// The digest covers the canonical JSON of `(args, kwargs)`. Keyword
/// arguments live in a `BTreeMap`, so their order never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(
        operation: &str,
        args: &[serde_json::Value],
        kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let canonical = serde_json::json!([args, kwargs]).to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{}:{}", operation, hex::encode(hasher.finalize())))
    }

    /// Key for an operation without parameters
    pub fn for_operation(operation: &str) -> Self {
        Self::derive(operation, &[], &BTreeMap::new())
    }

    /// Operation name (everything before the first ':')
    pub fn operation(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its trailing `:{digest}`; plain keys come back whole
    pub fn readable(&self) -> &str {
        match self.0.rsplit_once(':') {
            Some((head, digest))
                if digest.len() == DIGEST_HEX_LEN
                    && digest.bytes().all(|b| b.is_ascii_hexdigit()) =>
            {
                head
            }
            _ => &self.0,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// A cached value with its freshness bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub created_at_ms: i64,
    pub ttl: Duration,
    pub access_count: u64,
    pub last_access_ms: i64,
    pub category: Option<String>,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, ttl: Duration, now_ms: i64) -> Self {
        Self {
            value,
            created_at_ms: now_ms,
            ttl,
            access_count: 0,
            last_access_ms: now_ms,
            category: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Expired iff `now - created_at > ttl`
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.age_ms(now_ms) > self.ttl_ms()
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    pub fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Record a read
    pub fn access(&mut self, now_ms: i64) -> &serde_json::Value {
        self.access_count += 1;
        self.last_access_ms = now_ms;
        &self.value
    }
}
