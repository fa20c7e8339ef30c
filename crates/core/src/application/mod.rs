// Application Layer - Scheduling services built on the ports

pub mod command_bus;
pub mod panic_guard;
pub mod priority_queue;
pub mod result_cache;
pub mod worker_pool;

// Re-exports
pub use command_bus::{BusEvent, CommandBus, HistoryEntry};
pub use priority_queue::PriorityQueue;
pub use result_cache::{
    CacheEvent, CachePersistence, CacheStats, CallParams, PredictiveCache, ResultCache, TtlTable,
};
pub use worker_pool::{AdaptiveWorkerPool, PerformanceReport, PoolEvent};
