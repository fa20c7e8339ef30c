// Domain Layer - Pure scheduling entities and value types

pub mod cache_entry;
pub mod command;
pub mod error;
pub mod priority;
pub mod signal;
pub mod task;

// Re-exports
pub use cache_entry::{CacheEntry, CacheKey};
pub use command::{
    CommandCallback, CommandError, CommandRequest, CommandResult, CommandSpec, RequestId,
    RunnerState,
};
pub use error::DomainError;
pub use priority::Priority;
pub use signal::{stop_channel, StopHandle, StopToken};
pub use task::{
    ProgressSink, TaskContext, TaskError, TaskFn, TaskId, TaskOutput, TaskResult, TaskState,
    TaskUnit,
};
