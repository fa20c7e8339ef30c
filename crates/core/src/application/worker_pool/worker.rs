// Worker - Task execution loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::events::PoolEvent;
use super::queue::TaskQueue;
use super::retry::{RetryDecision, RetryPolicy};
use super::stats::StatsRegistry;
use crate::application::panic_guard::panic_message;
use crate::domain::{ProgressSink, StopToken, TaskContext, TaskError, TaskFn, TaskResult, TaskUnit};
use crate::port::TimeProvider;

/// State shared by the pool and all of its workers
pub(super) struct PoolShared {
    pub queue: TaskQueue,
    pub stats: Mutex<StatsRegistry>,
    pub events: broadcast::Sender<PoolEvent>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub retry_policy: RetryPolicy,
    pub poll_interval: Duration,
    pub busy: AtomicUsize,
    pub progress: ProgressSink,
}

impl PoolShared {
    pub fn lock_stats(&self) -> MutexGuard<'_, StatsRegistry> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emit(&self, event: PoolEvent) {
        let _ = self.events.send(event);
    }
}

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WorkerExit {
    Retired,
    Shutdown,
}

/// Worker pulls tasks from the shared queue until retired or shut down
pub(super) struct Worker {
    id: usize,
    shared: Arc<PoolShared>,
}

impl Worker {
    pub fn new(id: usize, shared: Arc<PoolShared>) -> Self {
        Self { id, shared }
    }

    /// Run worker loop with graceful shutdown support.
    ///
    /// A task already popped always runs to completion; the stop signals are
    /// only observed between tasks.
    pub async fn run(self, mut retire: StopToken, mut shutdown: StopToken) -> WorkerExit {
        info!(worker_id = self.id, "Worker started");
        let exit = loop {
            if shutdown.is_stopped() {
                break WorkerExit::Shutdown;
            }
            if retire.is_stopped() {
                break WorkerExit::Retired;
            }

            let task = tokio::select! {
                task = self.shared.queue.pop_timeout(self.shared.poll_interval) => task,
                _ = retire.wait() => break WorkerExit::Retired,
                _ = shutdown.wait() => break WorkerExit::Shutdown,
            };

            if let Some(task) = task {
                self.process(task).await;
            }
        };

        if exit == WorkerExit::Retired {
            self.shared.lock_stats().retire(self.id);
        }
        info!(worker_id = self.id, reason = ?exit, "Worker stopped");
        exit
    }

    /// Execute one task and settle it: success, requeue, or drop
    async fn process(&self, mut task: TaskUnit) {
        if let Err(e) = task.start() {
            error!(task_id = %task.id, error = %e, "Task popped in unexpected state");
            return;
        }

        debug!(
            worker_id = self.id,
            task_id = %task.id,
            priority = %task.priority,
            attempt = task.retry_count,
            "Executing task"
        );
        self.shared.emit(PoolEvent::Started {
            task_id: task.id.clone(),
            worker_id: self.id,
        });

        let ctx = TaskContext::new(
            task.id.clone(),
            task.retry_count,
            Some(Arc::clone(&self.shared.progress)),
        );

        self.shared.busy.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let outcome = run_payload(&task.func, ctx).await;
        let duration = started.elapsed();
        self.shared.busy.fetch_sub(1, Ordering::SeqCst);

        let now = self.shared.time_provider.now_millis();
        self.shared
            .lock_stats()
            .record(self.id, duration, outcome.is_ok(), now);

        match outcome {
            Ok(output) => {
                if let Err(e) = task.succeed() {
                    warn!(task_id = %task.id, error = %e, "Unexpected task state");
                }
                info!(
                    task_id = %task.id,
                    duration_ms = duration.as_millis() as u64,
                    "Task completed"
                );
                self.shared.emit(PoolEvent::Finished {
                    task_id: task.id,
                    duration_ms: duration.as_millis() as u64,
                    output,
                });
            }
            Err(err) => self.handle_failure(task, err),
        }
    }

    fn handle_failure(&self, mut task: TaskUnit, err: TaskError) {
        match self.shared.retry_policy.should_retry(&task, &err) {
            RetryDecision::Retry { attempt, priority } => {
                if let Err(e) = self.shared.retry_policy.prepare_for_retry(&mut task) {
                    error!(task_id = %task.id, error = %e, "Could not requeue task");
                    return;
                }
                warn!(
                    task_id = %task.id,
                    attempt,
                    priority = %priority,
                    error = %err,
                    "Retrying task after failure"
                );
                self.shared.emit(PoolEvent::Retrying {
                    task_id: task.id.clone(),
                    attempt,
                    priority,
                    error: err.to_string(),
                });
                self.shared.queue.push(task);
            }
            RetryDecision::Failed(final_error) => {
                if let Err(e) = task.fail() {
                    warn!(task_id = %task.id, error = %e, "Unexpected task state");
                }
                error!(task_id = %task.id, error = %final_error, "Task failed");
                self.shared.emit(PoolEvent::Failed {
                    task_id: task.id,
                    error: final_error,
                });
            }
        }
    }
}

/// Run the payload on its own tokio task so a panic surfaces as a `JoinError`
async fn run_payload(func: &TaskFn, ctx: TaskContext) -> TaskResult {
    let joined = match func {
        TaskFn::Blocking(f) => {
            let f = Arc::clone(f);
            tokio::task::spawn_blocking(move || (*f)(&ctx)).await
        }
        TaskFn::Async(f) => {
            let fut = (**f)(ctx);
            tokio::task::spawn(fut).await
        }
    };

    match joined {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            let msg = panic_message(join_err.into_panic().as_ref());
            Err(TaskError::Panicked(msg))
        }
        Err(join_err) => Err(TaskError::Terminal(format!("Task cancelled: {}", join_err))),
    }
}
