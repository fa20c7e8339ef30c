// Bus notifications and history records

use serde::Serialize;
use std::path::PathBuf;

use crate::domain::{CommandResult, Priority, RequestId};

/// Lifecycle notifications published by the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    Queued {
        request_id: RequestId,
        priority: Priority,
        queue_len: usize,
    },
    Started {
        request_id: RequestId,
        path: PathBuf,
        args: Vec<String>,
    },
    Finished {
        request_id: RequestId,
        success: bool,
    },
    QueueUpdated {
        queue_len: usize,
    },
}

/// One completed request, kept in the bounded history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub request_id: RequestId,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub priority: Priority,
    pub finished_at_ms: i64,
    pub result: CommandResult,
}
