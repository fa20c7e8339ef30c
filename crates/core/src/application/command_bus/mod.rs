// Priority command bus
//
// Bounded-concurrency dispatcher for external commands. Pending requests wait
// in a priority queue; every completion frees a slot and re-runs dispatch, so
// no polling is involved.

mod events;

pub use events::{BusEvent, HistoryEntry};

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::application::panic_guard::{execute_guarded, PanicGuardResult};
use crate::application::priority_queue::PriorityQueue;
use crate::config::BusConfig;
use crate::domain::{
    stop_channel, CommandCallback, CommandRequest, CommandResult, CommandSpec, Priority,
    RequestId, RunnerState, StopHandle, StopToken,
};
use crate::error::{AppError, Result};
use crate::port::{
    CommandRunner, ExitCodeInterpreter, IdProvider, SequenceIdProvider, TimeProvider,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct ActiveRun {
    stop: StopHandle,
    state: RunnerState,
    spec: CommandSpec,
    priority: Priority,
    started: Instant,
}

#[derive(Default)]
struct BusState {
    queue: PriorityQueue<CommandRequest>,
    active: HashMap<RequestId, ActiveRun>,
    history: VecDeque<HistoryEntry>,
}

struct BusInner {
    config: BusConfig,
    runner: Arc<dyn CommandRunner>,
    exit_codes: Arc<dyn ExitCodeInterpreter>,
    time_provider: Arc<dyn TimeProvider>,
    ids: Box<dyn IdProvider>,
    state: Mutex<BusState>,
    events: broadcast::Sender<BusEvent>,
    runtime: Handle,
}

/// Priority-ordered external command bus.
///
/// Cheap to clone; all clones share one queue and one set of active runners.
/// `submit` never blocks and every accepted request gets exactly one callback.
#[derive(Clone)]
pub struct CommandBus {
    inner: Arc<BusInner>,
}

impl CommandBus {
    /// Create a bus bound to the current tokio runtime
    pub fn new(
        config: BusConfig,
        runner: Arc<dyn CommandRunner>,
        exit_codes: Arc<dyn ExitCodeInterpreter>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            AppError::InvalidState(format!("CommandBus needs a tokio runtime: {}", e))
        })?;
        if config.max_concurrent == 0 {
            return Err(AppError::Config("bus.max_concurrent must be at least 1".into()));
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        info!(max_concurrent = config.max_concurrent, "Command bus created");

        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                runner,
                exit_codes,
                time_provider,
                ids: Box::new(SequenceIdProvider::new("cmd")),
                state: Mutex::new(BusState::default()),
                events,
                runtime,
            }),
        })
    }

    /// Queue a command. Returns its request id.
    ///
    /// A missing executable resolves synchronously with an
    /// `ExecutableNotFound` result and is never queued. `timeout = None`
    /// uses `bus.default_timeout_secs`.
    pub fn submit<F>(
        &self,
        path: impl Into<PathBuf>,
        args: Vec<String>,
        priority: Priority,
        timeout: Option<Duration>,
        callback: F,
    ) -> RequestId
    where
        F: FnOnce(CommandResult) + Send + 'static,
    {
        let inner = &self.inner;
        let id = inner.ids.generate_id();
        let timeout = timeout.unwrap_or_else(|| inner.config.default_timeout());
        let spec = CommandSpec::new(path, args, timeout);

        if !inner.runner.executable_exists(&spec.path) {
            warn!(request_id = %id, path = %spec.path.display(), "Executable not found");
            let result = CommandResult::not_found(spec.path.clone());
            inner.finish(&id, &spec, priority, result, Box::new(callback));
            return id;
        }

        let queue_len = {
            let mut state = inner.lock_state();
            state.queue.push(
                priority,
                CommandRequest {
                    id: id.clone(),
                    spec,
                    priority,
                    callback: Box::new(callback),
                },
            );
            state.queue.len()
        };
        debug!(request_id = %id, priority = %priority, queue_len, "Command queued");
        inner.emit(BusEvent::Queued {
            request_id: id.clone(),
            priority,
            queue_len,
        });

        BusInner::dispatch(inner);
        id
    }

    /// Submit and await the result
    pub async fn submit_and_wait(
        &self,
        path: impl Into<PathBuf>,
        args: Vec<String>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> CommandResult {
        let (tx, rx) = oneshot::channel();
        self.submit(path, args, priority, timeout, move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| CommandResult::cancelled(Duration::ZERO))
    }

    /// Cancel a request.
    ///
    /// A queued request is removed and its callback receives a `Cancelled`
    /// result; a running one has its process terminated. Returns false for
    /// unknown or already finished ids.
    pub fn cancel(&self, request_id: &str) -> bool {
        let inner = &self.inner;
        let queued = {
            let mut state = inner.lock_state();
            if let Some(run) = state.active.get(request_id) {
                info!(request_id = %request_id, "Cancelling running command");
                run.stop.stop();
                return true;
            }
            state.queue.remove_where(|req| req.id == request_id)
        };

        match queued {
            Some(request) => {
                info!(request_id = %request_id, "Cancelled queued command");
                inner.emit(BusEvent::QueueUpdated {
                    queue_len: self.queue_len(),
                });
                let CommandRequest {
                    id,
                    spec,
                    priority,
                    callback,
                } = request;
                inner.finish(&id, &spec, priority, CommandResult::cancelled(Duration::ZERO), callback);
                true
            }
            None => false,
        }
    }

    /// Cancel everything: queued requests first, then running ones
    pub fn cancel_all(&self) -> usize {
        let (queued, running) = {
            let mut state = self.inner.lock_state();
            let queued = state.queue.drain_ordered();
            for run in state.active.values() {
                run.stop.stop();
            }
            (queued, state.active.len())
        };
        let cancelled = queued.len() + running;
        for request in queued {
            self.inner.finish(
                &request.id,
                &request.spec,
                request.priority,
                CommandResult::cancelled(Duration::ZERO),
                request.callback,
            );
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelled all commands");
        }
        cancelled
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock_state().active.len()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.config.max_concurrent
    }

    /// Most recent completions, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.lock_state().history.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.inner.events.subscribe()
    }
}

impl BusInner {
    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BusEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Start queued requests while slots are free
    fn dispatch(this: &Arc<Self>) {
        loop {
            let (request, token, queue_len) = {
                let mut state = this.lock_state();
                if state.active.len() >= this.config.max_concurrent {
                    return;
                }
                let Some(request) = state.queue.pop() else {
                    return;
                };
                let (stop, token) = stop_channel();
                let mut runner_state = RunnerState::Idle;
                if let Err(e) = runner_state.transition(RunnerState::Running) {
                    warn!(request_id = %request.id, error = %e, "Unexpected runner state");
                }
                state.active.insert(
                    request.id.clone(),
                    ActiveRun {
                        stop,
                        state: runner_state,
                        spec: request.spec.clone(),
                        priority: request.priority,
                        started: Instant::now(),
                    },
                );
                (request, token, state.queue.len())
            };

            info!(
                request_id = %request.id,
                path = %request.spec.path.display(),
                priority = %request.priority,
                "Starting command"
            );
            this.emit(BusEvent::Started {
                request_id: request.id.clone(),
                path: request.spec.path.clone(),
                args: request.spec.args.clone(),
            });
            this.emit(BusEvent::QueueUpdated { queue_len });

            let bus = Arc::clone(this);
            this.runtime.spawn(async move {
                bus.execute(request, token).await;
            });
        }
    }

    async fn execute(self: Arc<Self>, request: CommandRequest, token: StopToken) {
        let result = self.runner.run(&request.spec, token).await;
        let result = match result.return_code {
            Some(code) if code != 0 => {
                let hint = self.exit_codes.hint(code);
                result.with_hint(hint)
            }
            _ => result,
        };

        let run = self.lock_state().active.remove(&request.id);
        if let Some(mut run) = run {
            if let Err(e) = run.state.transition(RunnerState::terminal_for(&result)) {
                warn!(request_id = %request.id, error = %e, "Unexpected runner state");
            }
            debug!(
                request_id = %request.id,
                state = ?run.state,
                priority = %run.priority,
                elapsed_ms = run.started.elapsed().as_millis() as u64,
                "Runner released slot"
            );
        }

        let CommandRequest {
            id,
            spec,
            priority,
            callback,
        } = request;
        self.finish(&id, &spec, priority, result, callback);
        BusInner::dispatch(&self);
    }

    /// Record, notify and deliver a result. Called exactly once per request.
    fn finish(
        &self,
        id: &str,
        spec: &CommandSpec,
        priority: Priority,
        result: CommandResult,
        callback: CommandCallback,
    ) {
        if result.success {
            info!(
                request_id = %id,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "Command finished"
            );
        } else {
            warn!(request_id = %id, error = %result.error, "Command failed");
        }

        {
            let mut state = self.lock_state();
            if state.history.len() >= self.config.history_limit {
                state.history.pop_front();
            }
            if self.config.history_limit > 0 {
                state.history.push_back(HistoryEntry {
                    request_id: id.to_string(),
                    path: spec.path.clone(),
                    args: spec.args.clone(),
                    priority,
                    finished_at_ms: self.time_provider.now_millis(),
                    result: result.clone(),
                });
            }
        }

        self.emit(BusEvent::Finished {
            request_id: id.to_string(),
            success: result.success,
        });

        if let PanicGuardResult::Panicked(msg) =
            execute_guarded(AssertUnwindSafe(move || callback(result)))
        {
            warn!(request_id = %id, panic_msg = %msg, "Completion callback panicked");
        }
    }
}
