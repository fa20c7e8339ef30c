// Retry logic for failed tasks
use crate::domain::{Priority, TaskError, TaskUnit};
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue at the given (demoted) priority
    Retry { attempt: u32, priority: Priority },
    /// Do not retry; the task is dropped with this error
    Failed(TaskError),
}

/// Retry policy
///
/// Determines if a task should be retried based on:
/// - Whether the error is retryable (anything but `TaskError::Terminal`)
/// - Current retry count against the task's `max_retries`
///
/// Each retry drops the task one priority band so a flapping task cannot
/// starve fresh work.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide what happens to `task` after it failed with `error`
    ///
    /// # Example
    /// ```text
    /// match policy.should_retry(&task, &err) {
    ///     RetryDecision::Retry { priority, .. } => queue.push(task),
    ///     RetryDecision::Failed(final_error) => report(final_error),
    /// }
    /// ```
    pub fn should_retry(&self, task: &TaskUnit, error: &TaskError) -> RetryDecision {
        if !error.is_retryable() {
            warn!(task_id = %task.id, error = %error, "Task error is not retryable");
            return RetryDecision::Failed(error.clone());
        }

        if !task.can_retry() {
            warn!(
                task_id = %task.id,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                "Max retries reached"
            );
            return RetryDecision::Failed(TaskError::RetriesExhausted {
                attempts: task.retry_count + 1,
                last_error: error.to_string(),
            });
        }

        RetryDecision::Retry {
            attempt: task.retry_count + 1,
            priority: task.priority.demote(),
        }
    }

    /// Prepare a task for retry
    ///
    /// Increments the retry counter and demotes the priority
    pub fn prepare_for_retry(&self, task: &mut TaskUnit) -> crate::error::Result<()> {
        task.requeue()?;
        info!(
            task_id = %task.id,
            retry_count = task.retry_count,
            priority = %task.priority,
            "Task prepared for retry"
        );
        Ok(())
    }
}
