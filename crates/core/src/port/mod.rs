// Port Layer - Interfaces for external dependencies

pub mod cache_store;
pub mod command_runner;
pub mod exit_code;
pub mod id_provider; // For deterministic testing
pub mod system_probe;
pub mod time_provider;

// Re-exports
pub use cache_store::{CacheSnapshotStore, SnapshotEntry, StoreError};
pub use command_runner::CommandRunner;
pub use exit_code::{normalize_exit_code, ExitCodeHintTable, ExitCodeInterpreter, NoExitCodeHints};
pub use id_provider::{IdProvider, SequenceIdProvider, UuidProvider};
pub use system_probe::{SystemMetrics, SystemProbe};
pub use time_provider::{SystemTimeProvider, TimeProvider};
