// In-process task model for the worker pool

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::error::DomainError;
use super::priority::Priority;

pub type TaskId = String;

/// Value produced by a successful task
pub type TaskOutput = serde_json::Value;

pub type TaskResult = Result<TaskOutput, TaskError>;

/// Task failure taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskError {
    /// Transient failure, eligible for retry
    #[error("Task raised: {0}")]
    Exception(String),

    /// Failure that retrying cannot fix
    #[error("Task failed permanently: {0}")]
    Terminal(String),

    /// Panic caught at the worker boundary; retried like an exception
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl TaskError {
    pub fn exception(msg: impl Into<String>) -> Self {
        TaskError::Exception(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Exception(_) | TaskError::Panicked(_))
    }
}

/// Progress callback installed by the pool: (task id, percent)
pub type ProgressSink = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Per-execution context handed to a task
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    /// Zero on the first run, incremented on every retry
    pub attempt: u32,
    progress: Option<ProgressSink>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<TaskId>, attempt: u32, progress: Option<ProgressSink>) -> Self {
        Self {
            task_id: task_id.into(),
            attempt,
            progress,
        }
    }

    /// Report progress in percent (clamped to 100)
    pub fn report_progress(&self, percent: u8) {
        if let Some(sink) = &self.progress {
            sink(&self.task_id, percent.min(100));
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

pub type BlockingTaskFn = dyn Fn(&TaskContext) -> TaskResult + Send + Sync;
pub type AsyncTaskFn = dyn Fn(TaskContext) -> BoxFuture<'static, TaskResult> + Send + Sync;

/// Task payload: a closure that captures its own arguments.
///
/// `Fn` rather than `FnOnce` because a retried task runs again.
#[derive(Clone)]
pub enum TaskFn {
    /// CPU-bound or blocking work, run on the blocking thread pool
    Blocking(Arc<BlockingTaskFn>),
    /// Async work, run as a tokio task
    Async(Arc<AsyncTaskFn>),
}

impl TaskFn {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
    {
        TaskFn::Blocking(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        TaskFn::Async(Arc::new(move |ctx: TaskContext| -> BoxFuture<'static, TaskResult> {
            Box::pin(f(ctx))
        }))
    }
}

impl std::fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFn::Blocking(_) => write!(f, "TaskFn::Blocking"),
            TaskFn::Async(_) => write!(f, "TaskFn::Async"),
        }
    }
}

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Created,
    Queued,
    Executing,
    Succeeded,
    /// Demoted and put back on the queue after a failure
    Requeued,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Unit of work scheduled by the pool
#[derive(Debug, Clone)]
pub struct TaskUnit {
    pub id: TaskId,
    pub func: TaskFn,
    pub priority: Priority,
    pub created_at: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub state: TaskState,
}

impl TaskUnit {
    pub fn new(
        id: impl Into<TaskId>,
        func: TaskFn,
        priority: Priority,
        max_retries: u32,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            func,
            priority,
            created_at,
            retry_count: 0,
            max_retries,
            state: TaskState::Created,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn mark_queued(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Created], TaskState::Queued)
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Queued, TaskState::Requeued], TaskState::Executing)
    }

    pub fn succeed(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Executing], TaskState::Succeeded)
    }

    /// Bump the retry counter and drop one priority band
    pub fn requeue(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Executing], TaskState::Requeued)?;
        self.retry_count += 1;
        self.priority = self.priority.demote();
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Executing], TaskState::Failed)
    }

    fn transition(&mut self, from: &[TaskState], to: TaskState) -> Result<(), DomainError> {
        if !from.contains(&self.state) {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", to),
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn noop() -> TaskFn {
        TaskFn::blocking(|_| Ok(serde_json::Value::Null))
    }

    #[test]
    fn test_lifecycle_success() {
        let mut task = TaskUnit::new("t1", noop(), Priority::High, 2, 0);
        task.mark_queued().unwrap();
        task.start().unwrap();
        task.succeed().unwrap();
        assert!(task.state.is_terminal());
        assert!(task.start().is_err());
    }

    #[test]
    fn test_requeue_demotes_and_counts() {
        let mut task = TaskUnit::new("t1", noop(), Priority::Critical, 2, 0);
        task.mark_queued().unwrap();

        task.start().unwrap();
        task.requeue().unwrap();
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.priority, Priority::High);
        assert!(task.can_retry());

        task.start().unwrap();
        task.requeue().unwrap();
        assert_eq!(task.priority, Priority::Normal);
        assert!(!task.can_retry());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(TaskError::exception("flaky").is_retryable());
        assert!(TaskError::Panicked("oops".into()).is_retryable());
        assert!(!TaskError::Terminal("bad input".into()).is_retryable());
    }

    #[test]
    fn test_progress_is_clamped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: ProgressSink = Arc::new(move |id: &str, p: u8| {
            seen_clone.lock().unwrap().push((id.to_string(), p));
        });
        let ctx = TaskContext::new("t9", 0, Some(sink));
        ctx.report_progress(40);
        ctx.report_progress(250);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("t9".to_string(), 40), ("t9".to_string(), 100)]);
    }

    #[tokio::test]
    async fn test_async_payload_runs() {
        let func = TaskFn::from_async(|ctx: TaskContext| async move {
            Ok(serde_json::json!({ "attempt": ctx.attempt }))
        });
        let out = match func {
            TaskFn::Async(f) => f(TaskContext::new("a", 3, None)).await.unwrap(),
            TaskFn::Blocking(_) => unreachable!(),
        };
        assert_eq!(out["attempt"], 3);
    }
}
