// SQLite CacheSnapshotStore Implementation

use async_trait::async_trait;
use commandeer_core::port::{CacheSnapshotStore, SnapshotEntry, StoreError};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::map_sqlx_error;

/// Cache snapshots in a single `cache_entries` table
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheSnapshotStore for SqliteCacheStore {
    async fn load(&self) -> Result<Vec<SnapshotEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT key, value, created_at_ms, ttl_ms, access_count, last_access_ms, category
            FROM cache_entries
            ORDER BY created_at_ms DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(map_sqlx_error)?;
            let raw: String = row.try_get("value").map_err(map_sqlx_error)?;
            // One corrupt row must not cost the rest of the snapshot
            let value = match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable cache row");
                    continue;
                }
            };
            let access_count: i64 = row.try_get("access_count").map_err(map_sqlx_error)?;
            entries.push(SnapshotEntry {
                key,
                value,
                created_at_ms: row.try_get("created_at_ms").map_err(map_sqlx_error)?,
                ttl_ms: row.try_get("ttl_ms").map_err(map_sqlx_error)?,
                access_count: access_count.max(0) as u64,
                last_access_ms: row.try_get("last_access_ms").map_err(map_sqlx_error)?,
                category: row.try_get("category").map_err(map_sqlx_error)?,
            });
        }
        debug!(count = entries.len(), "Cache snapshot loaded");
        Ok(entries)
    }

    async fn save(&self, entries: &[SnapshotEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM cache_entries")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for entry in entries {
            let value = serde_json::to_string(&entry.value)?;
            sqlx::query(
                r#"
                INSERT INTO cache_entries
                    (key, value, created_at_ms, ttl_ms, access_count, last_access_ms, category)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.key)
            .bind(value)
            .bind(entry.created_at_ms)
            .bind(entry.ttl_ms)
            .bind(entry.access_count as i64)
            .bind(entry.last_access_ms)
            .bind(&entry.category)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = entries.len(), "Cache snapshot saved");
        Ok(())
    }
}
