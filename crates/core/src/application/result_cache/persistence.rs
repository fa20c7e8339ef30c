// Cache persistence
// Write-behind snapshots of the result cache

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::ResultCache;
use crate::domain::StopToken;
use crate::error::Result;
use crate::port::CacheSnapshotStore;

/// Keeps a snapshot store in sync with a [`ResultCache`].
///
/// Mutations only mark the cache dirty; the snapshot is written on the next
/// flush tick, and once more on shutdown.
pub struct CachePersistence {
    cache: ResultCache,
    store: Arc<dyn CacheSnapshotStore>,
    flush_interval: Duration,
    dirty: AtomicBool,
}

impl CachePersistence {
    pub fn new(
        cache: ResultCache,
        store: Arc<dyn CacheSnapshotStore>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            flush_interval,
            dirty: AtomicBool::new(false),
        }
    }

    /// Restore the stored snapshot into the cache
    pub async fn load(&self) -> Result<usize> {
        let entries = self.store.load().await?;
        let stored = entries.len();
        let loaded = self.cache.restore(entries);
        info!(stored, loaded, "Cache snapshot restored");
        Ok(loaded)
    }

    /// Write the current cache contents; returns the entry count
    pub async fn flush(&self) -> Result<usize> {
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = self.cache.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e.into());
        }
        debug!(entries = snapshot.len(), "Cache snapshot written");
        Ok(snapshot.len())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Background write-behind loop. Exits after a final flush once
    /// `shutdown` fires.
    pub fn spawn(self: Arc<Self>, mut shutdown: StopToken) -> JoinHandle<()> {
        let mut events = self.cache.subscribe();
        tokio::spawn(async move {
            info!(
                flush_interval_ms = self.flush_interval.as_millis() as u64,
                "Cache persistence started"
            );
            let mut tick = interval(self.flush_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) if event.is_mutation() => {
                            self.dirty.store(true, Ordering::SeqCst);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Cache events lagged; scheduling a flush");
                            self.dirty.store(true, Ordering::SeqCst);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tick.tick() => {
                        if self.is_dirty() {
                            if let Err(e) = self.flush().await {
                                error!(error = %e, "Cache snapshot write failed");
                            }
                        }
                    }
                    _ = shutdown.wait() => break,
                }
            }

            match self.flush().await {
                Ok(entries) => info!(entries, "Cache persistence stopped"),
                Err(e) => error!(error = %e, "Final cache snapshot write failed"),
            }
        })
    }
}
