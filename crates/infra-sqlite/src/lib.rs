// Commandeer Infrastructure - SQLite Adapter
// Implements: CacheSnapshotStore

mod cache_store;
mod connection;
mod error;
mod migration;

pub use cache_store::SqliteCacheStore;
pub use connection::create_pool;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
