// Shared task queue

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::application::priority_queue::PriorityQueue;
use crate::domain::TaskUnit;

/// Priority queue shared by every worker.
///
/// `push` never blocks; `pop_timeout` parks the caller until a task arrives
/// or the poll interval elapses.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<PriorityQueue<TaskUnit>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PriorityQueue<TaskUnit>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, task: TaskUnit) {
        self.lock().push(task.priority, task);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<TaskUnit> {
        self.lock().pop()
    }

    /// Pop the most urgent task, waiting at most `timeout`.
    ///
    /// Cancel safe: a task is only removed in the same poll that returns it.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<TaskUnit> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every pending task
    pub fn drain(&self) -> Vec<TaskUnit> {
        self.lock().drain_ordered()
    }
}
