// Cache snapshot storage port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serialized form of one cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at_ms: i64,
    pub ttl_ms: i64,
    pub access_count: u64,
    pub last_access_ms: i64,
    pub category: Option<String>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Persistent store holding the latest cache snapshot
#[async_trait]
pub trait CacheSnapshotStore: Send + Sync {
    /// Load every stored entry
    async fn load(&self) -> Result<Vec<SnapshotEntry>, StoreError>;

    /// Replace the stored snapshot with `entries`
    async fn save(&self, entries: &[SnapshotEntry]) -> Result<(), StoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// In-memory snapshot store
    #[derive(Default)]
    pub struct MemorySnapshotStore {
        entries: Mutex<Vec<SnapshotEntry>>,
        saves: Mutex<usize>,
    }

    impl MemorySnapshotStore {
        pub fn with_entries(entries: Vec<SnapshotEntry>) -> Self {
            Self {
                entries: Mutex::new(entries),
                saves: Mutex::new(0),
            }
        }

        pub fn entries(&self) -> Vec<SnapshotEntry> {
            self.entries.lock().unwrap().clone()
        }

        pub fn save_count(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl CacheSnapshotStore for MemorySnapshotStore {
        async fn load(&self) -> Result<Vec<SnapshotEntry>, StoreError> {
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn save(&self, entries: &[SnapshotEntry]) -> Result<(), StoreError> {
            *self.entries.lock().unwrap() = entries.to_vec();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }
}
