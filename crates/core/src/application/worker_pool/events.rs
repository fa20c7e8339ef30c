// Pool notifications

use serde::Serialize;

use crate::domain::{Priority, TaskError, TaskId, TaskOutput};

/// Task and pool lifecycle notifications, keyed by task id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    Started {
        task_id: TaskId,
        worker_id: usize,
    },
    Progress {
        task_id: TaskId,
        percent: u8,
    },
    Finished {
        task_id: TaskId,
        duration_ms: u64,
        output: TaskOutput,
    },
    Retrying {
        task_id: TaskId,
        attempt: u32,
        priority: Priority,
        error: String,
    },
    Failed {
        task_id: TaskId,
        error: TaskError,
    },
    Scaled {
        from: usize,
        to: usize,
        reason: String,
    },
}
