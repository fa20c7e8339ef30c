// Adaptive worker pool
//
// N long-lived workers share one priority queue. A monitor task samples the
// system probe every `scale_interval` and grows or shrinks the pool one
// worker at a time.

pub mod constants;
mod events;
mod queue;
mod retry;
mod scaling;
mod stats;
mod worker;

pub use events::PoolEvent;
pub use queue::TaskQueue;
pub use retry::{RetryDecision, RetryPolicy};
pub use scaling::{ScalingDecision, ScalingPolicy};
pub use stats::{AggregateStats, PerformanceReport, PoolStatus, WorkerReport, WorkerStats};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use constants::EVENT_CHANNEL_CAPACITY;
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::domain::{stop_channel, Priority, StopHandle, StopToken, TaskFn, TaskId, TaskUnit};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, SystemMetrics, SystemProbe, TimeProvider, UuidProvider};
use stats::StatsRegistry;
use worker::{PoolShared, Worker, WorkerExit};

struct WorkerHandle {
    id: usize,
    retire: StopHandle,
    join: JoinHandle<WorkerExit>,
}

#[derive(Default)]
struct WorkerSet {
    live: Vec<WorkerHandle>,
    /// Retired workers still finishing their in-flight task
    retiring: Vec<JoinHandle<WorkerExit>>,
}

struct PoolInner {
    config: PoolConfig,
    shared: Arc<PoolShared>,
    probe: Arc<dyn SystemProbe>,
    scaling: ScalingPolicy,
    ids: Box<dyn IdProvider>,
    workers: Mutex<WorkerSet>,
    last_metrics: Mutex<Option<SystemMetrics>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    shutdown: StopHandle,
    stopped: AtomicBool,
    next_worker_id: AtomicUsize,
    started_at_ms: i64,
    runtime: Handle,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Workers only hold the shared state, so they need an explicit stop
        self.shutdown.stop();
    }
}

/// Priority worker pool with retry and resource-driven scaling.
///
/// `submit` never blocks and never fails. Cheap to clone.
#[derive(Clone)]
pub struct AdaptiveWorkerPool {
    inner: Arc<PoolInner>,
}

impl AdaptiveWorkerPool {
    /// Start the pool on the current tokio runtime with
    /// `initial_workers` (clamped into `[min, max]`) and the scaling monitor.
    pub fn start(
        config: PoolConfig,
        probe: Arc<dyn SystemProbe>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            AppError::InvalidState(format!("AdaptiveWorkerPool needs a tokio runtime: {}", e))
        })?;
        if config.min_workers == 0 || config.min_workers > config.max_workers {
            return Err(AppError::Config(format!(
                "invalid worker bounds: min {} max {}",
                config.min_workers, config.max_workers
            )));
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let progress_events = events.clone();
        let shared = Arc::new(PoolShared {
            queue: TaskQueue::new(),
            stats: Mutex::new(StatsRegistry::default()),
            events,
            time_provider: Arc::clone(&time_provider),
            retry_policy: RetryPolicy::new(),
            poll_interval: config.poll_interval(),
            busy: AtomicUsize::new(0),
            progress: Arc::new(move |task_id: &str, percent: u8| {
                let _ = progress_events.send(PoolEvent::Progress {
                    task_id: task_id.to_string(),
                    percent,
                });
            }),
        });

        let scaling = ScalingPolicy::from_config(&config);
        let initial = scaling.clamp(config.initial_workers);
        let (shutdown, shutdown_token) = stop_channel();

        let pool = Self {
            inner: Arc::new(PoolInner {
                started_at_ms: time_provider.now_millis(),
                config,
                shared,
                probe,
                scaling,
                ids: Box::new(UuidProvider),
                workers: Mutex::new(WorkerSet::default()),
                last_metrics: Mutex::new(None),
                monitor: Mutex::new(None),
                shutdown,
                stopped: AtomicBool::new(false),
                next_worker_id: AtomicUsize::new(1),
                runtime,
            }),
        };

        pool.inner.scale_to(initial, "startup");
        let monitor = pool.inner.runtime.spawn(monitor_loop(
            Arc::downgrade(&pool.inner),
            pool.inner.config.scale_interval(),
            shutdown_token,
        ));
        *lock(&pool.inner.monitor) = Some(monitor);

        info!(
            workers = initial,
            min_workers = pool.inner.config.min_workers,
            max_workers = pool.inner.config.max_workers,
            "Worker pool started"
        );
        Ok(pool)
    }

    /// Queue a task with a generated id
    pub fn submit(&self, func: TaskFn, priority: Priority) -> TaskId {
        let id = self.inner.ids.generate_id();
        self.submit_named(id, func, priority)
    }

    /// Queue a task under a caller-chosen id
    pub fn submit_named(&self, id: impl Into<TaskId>, func: TaskFn, priority: Priority) -> TaskId {
        let inner = &self.inner;
        let now = inner.shared.time_provider.now_millis();
        let mut task = TaskUnit::new(id, func, priority, inner.config.max_retries, now);
        if let Err(e) = task.mark_queued() {
            warn!(task_id = %task.id, error = %e, "Unexpected task state on submit");
        }
        if inner.stopped.load(Ordering::SeqCst) {
            warn!(task_id = %task.id, "Pool is shut down; task queued but will not run");
        }

        let id = task.id.clone();
        inner.shared.queue.push(task);
        debug!(
            task_id = %id,
            priority = %priority,
            queue_depth = inner.shared.queue.len(),
            "Task submitted"
        );
        id
    }

    pub fn worker_count(&self) -> usize {
        self.inner.lock_workers().live.len()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.shared.queue.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.shared.events.subscribe()
    }

    /// Sample the probe and apply one scaling step (the monitor calls this periodically)
    pub async fn evaluate_scaling(&self) -> ScalingDecision {
        self.inner.evaluate_scaling().await
    }

    /// Per-worker and aggregate metrics plus current pool status
    pub fn performance_report(&self) -> PerformanceReport {
        let inner = &self.inner;
        let now = inner.shared.time_provider.now_millis();
        let active_workers = self.worker_count();
        let busy_workers = inner.shared.busy.load(Ordering::SeqCst);
        let (workers, aggregate) = {
            let stats = inner.shared.lock_stats();
            (stats.workers(now), stats.aggregate(inner.started_at_ms, now))
        };

        PerformanceReport {
            workers,
            aggregate,
            pool: PoolStatus {
                active_workers,
                min_workers: inner.config.min_workers,
                max_workers: inner.config.max_workers,
                busy_workers,
                queued_tasks: self.queue_depth(),
                utilisation_percent: if active_workers == 0 {
                    0.0
                } else {
                    busy_workers.min(active_workers) as f64 / active_workers as f64 * 100.0
                },
            },
            system: lock(&inner.last_metrics).clone(),
        }
    }

    /// Stop all workers.
    ///
    /// In-flight tasks finish, queued tasks never start. Waits at most
    /// `shutdown_grace_secs` for the workers, then returns the number of
    /// queued tasks that were dropped.
    pub async fn shutdown(&self) -> usize {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return 0;
        }
        info!("Worker pool shutting down");
        inner.shutdown.stop();

        let monitor = lock(&inner.monitor).take();
        let handles: Vec<JoinHandle<WorkerExit>> = {
            let mut workers = inner.lock_workers();
            let mut handles: Vec<_> = workers.live.drain(..).map(|w| w.join).collect();
            handles.append(&mut workers.retiring);
            handles
        };

        let grace = inner.config.shutdown_grace();
        let joined = tokio::time::timeout(grace, async {
            if let Some(monitor) = monitor {
                let _ = monitor.await;
            }
            join_all(handles).await
        })
        .await;
        match joined {
            Ok(_) => info!("All workers stopped"),
            Err(_) => warn!(
                grace_secs = grace.as_secs(),
                "Workers did not stop within the grace period"
            ),
        }

        let dropped = inner.shared.queue.drain().len();
        if dropped > 0 {
            warn!(dropped, "Dropped queued tasks on shutdown");
        }
        dropped
    }
}

impl PoolInner {
    fn lock_workers(&self) -> MutexGuard<'_, WorkerSet> {
        lock(&self.workers)
    }

    async fn evaluate_scaling(&self) -> ScalingDecision {
        let metrics = self.probe.get_metrics().await;
        *lock(&self.last_metrics) = Some(metrics.clone());

        if self.stopped.load(Ordering::SeqCst) {
            return ScalingDecision::Hold;
        }

        let workers = self.lock_workers().live.len();
        let depth = self.shared.queue.len();
        let decision = self.scaling.decide(&metrics, workers, depth);
        match &decision {
            ScalingDecision::Grow { to, reason } | ScalingDecision::Shrink { to, reason } => {
                self.scale_to(*to, reason);
            }
            ScalingDecision::Hold => debug!(
                workers,
                queue_depth = depth,
                cpu = metrics.cpu_usage_percent,
                "Scaling: hold"
            ),
        }
        decision
    }

    /// Spawn or retire workers until `target` are live
    fn scale_to(&self, target: usize, reason: &str) {
        let (from, to) = {
            let mut workers = self.lock_workers();
            let from = workers.live.len();
            while workers.live.len() < target {
                let handle = self.spawn_worker();
                workers.live.push(handle);
            }
            while workers.live.len() > target {
                if let Some(handle) = workers.live.pop() {
                    debug!(worker_id = handle.id, "Retiring worker");
                    handle.retire.stop();
                    workers.retiring.push(handle.join);
                }
            }
            workers.retiring.retain(|join| !join.is_finished());
            (from, workers.live.len())
        };

        if from != to {
            info!(from, to, reason = %reason, "Worker pool resized");
            self.shared.emit(PoolEvent::Scaled {
                from,
                to,
                reason: reason.to_string(),
            });
        }
    }

    fn spawn_worker(&self) -> WorkerHandle {
        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let now = self.shared.time_provider.now_millis();
        self.shared.lock_stats().register(id, now);

        let (retire, retire_token) = stop_channel();
        let worker = Worker::new(id, Arc::clone(&self.shared));
        let join = self
            .runtime
            .spawn(worker.run(retire_token, self.shutdown.token()));
        WorkerHandle { id, retire, join }
    }
}

async fn monitor_loop(
    pool: Weak<PoolInner>,
    period: std::time::Duration,
    mut shutdown: StopToken,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.wait() => break,
        }
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.evaluate_scaling().await;
    }
    debug!("Scaling monitor stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskContext, TaskError};
    use crate::port::system_probe::mocks::MockSystemProbe;
    use crate::port::SystemTimeProvider;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn config(min: usize, max: usize, initial: usize) -> PoolConfig {
        PoolConfig {
            min_workers: min,
            max_workers: max,
            initial_workers: initial,
            // Tests drive scaling by hand
            scale_interval_secs: 3600,
            poll_interval_ms: 20,
            ..PoolConfig::default()
        }
    }

    fn start(config: PoolConfig, probe: Arc<MockSystemProbe>) -> AdaptiveWorkerPool {
        AdaptiveWorkerPool::start(config, probe, Arc::new(SystemTimeProvider)).unwrap()
    }

    fn idle_probe() -> Arc<MockSystemProbe> {
        Arc::new(MockSystemProbe::new(10.0, 30))
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<PoolEvent>, mut pred: F) -> PoolEvent
    where
        F: FnMut(&PoolEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received in time")
    }

    fn is_terminal(event: &PoolEvent) -> bool {
        matches!(event, PoolEvent::Finished { .. } | PoolEvent::Failed { .. })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_task_completes() {
        let pool = start(config(1, 2, 2), idle_probe());
        let mut events = pool.subscribe();

        let id = pool.submit(
            TaskFn::blocking(|_| Ok(serde_json::json!({ "devices": 2 }))),
            Priority::Normal,
        );

        match wait_for(&mut events, is_terminal).await {
            PoolEvent::Finished { task_id, output, .. } => {
                assert_eq!(task_id, id);
                assert_eq!(output["devices"], 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_priority_order_with_single_worker() {
        let pool = start(config(1, 1, 1), idle_probe());
        let mut events = pool.subscribe();
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = |label: &'static str| {
            let order = Arc::clone(&order);
            TaskFn::blocking(move |_| {
                order.lock().unwrap().push(label);
                Ok(serde_json::Value::Null)
            })
        };

        pool.submit(
            TaskFn::blocking(|_| {
                std::thread::sleep(Duration::from_millis(100));
                Ok(serde_json::Value::Null)
            }),
            Priority::Normal,
        );
        // Let the worker pick up the blocker
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.submit(record("low"), Priority::Low);
        pool.submit(record("critical"), Priority::Critical);
        pool.submit(record("normal"), Priority::Normal);

        for _ in 0..4 {
            wait_for(&mut events, is_terminal).await;
        }
        assert_eq!(*order.lock().unwrap(), vec!["critical", "normal", "low"]);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retry_demotes_priority_then_succeeds() {
        let pool = start(config(1, 1, 1), idle_probe());
        let mut events = pool.subscribe();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        pool.submit_named(
            "flaky",
            TaskFn::blocking(move |ctx: &TaskContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                if ctx.attempt < 2 {
                    Err(TaskError::exception("device busy"))
                } else {
                    Ok(serde_json::json!(ctx.attempt))
                }
            }),
            Priority::Critical,
        );

        let mut retries = Vec::new();
        loop {
            match wait_for(&mut events, |e| {
                matches!(e, PoolEvent::Retrying { .. }) || is_terminal(e)
            })
            .await
            {
                PoolEvent::Retrying { attempt, priority, .. } => retries.push((attempt, priority)),
                PoolEvent::Finished { output, .. } => {
                    assert_eq!(output, serde_json::json!(2));
                    break;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }

        assert_eq!(retries, vec![(1, Priority::High), (2, Priority::Normal)]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retries_exhausted_drops_task() {
        let pool = start(config(1, 1, 1), idle_probe());
        let mut events = pool.subscribe();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        pool.submit(
            TaskFn::blocking(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TaskError::exception("always"))
            }),
            Priority::Normal,
        );

        match wait_for(&mut events, |e| matches!(e, PoolEvent::Failed { .. })).await {
            PoolEvent::Failed { error, .. } => assert_eq!(
                error,
                TaskError::RetriesExhausted {
                    attempts: 3,
                    last_error: "Task raised: always".into()
                }
            ),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let report = pool.performance_report();
        assert_eq!(report.aggregate.tasks_failed, 3);
        assert_eq!(report.aggregate.tasks_completed, 0);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_does_not_kill_worker() {
        let pool = start(
            PoolConfig {
                max_retries: 0,
                ..config(1, 1, 1)
            },
            idle_probe(),
        );
        let mut events = pool.subscribe();

        pool.submit_named(
            "boom",
            TaskFn::blocking(|_| panic!("payload bug")),
            Priority::High,
        );
        pool.submit_named(
            "after",
            TaskFn::blocking(|_| Ok(serde_json::json!("ok"))),
            Priority::Low,
        );

        match wait_for(&mut events, is_terminal).await {
            PoolEvent::Failed { task_id, error } => {
                assert_eq!(task_id, "boom");
                assert_eq!(
                    error,
                    TaskError::RetriesExhausted {
                        attempts: 1,
                        last_error: "Task panicked: payload bug".into()
                    }
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match wait_for(&mut events, is_terminal).await {
            PoolEvent::Finished { task_id, .. } => assert_eq!(task_id, "after"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_generated_task_ids_are_uuids() {
        let pool = start(config(1, 1, 1), idle_probe());
        let noop = || TaskFn::blocking(|_| Ok(serde_json::Value::Null));
        let first = pool.submit(noop(), Priority::Low);
        let second = pool.submit(noop(), Priority::Low);

        assert_ne!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
        assert_eq!(pool.submit_named("named", noop(), Priority::Low), "named");
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_task_is_retried_then_dropped() {
        let pool = start(config(1, 1, 1), idle_probe());
        let mut events = pool.subscribe();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        pool.submit_named(
            "boom",
            TaskFn::blocking(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("payload bug")
            }),
            Priority::High,
        );

        let mut retries = Vec::new();
        loop {
            match wait_for(&mut events, |e| {
                matches!(e, PoolEvent::Retrying { .. }) || is_terminal(e)
            })
            .await
            {
                PoolEvent::Retrying { attempt, priority, .. } => retries.push((attempt, priority)),
                PoolEvent::Failed { error, .. } => {
                    assert_eq!(
                        error,
                        TaskError::RetriesExhausted {
                            attempts: 3,
                            last_error: "Task panicked: payload bug".into()
                        }
                    );
                    break;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }

        assert_eq!(retries, vec![(1, Priority::Normal), (2, Priority::Low)]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_task_reports_progress() {
        let pool = start(config(1, 2, 1), idle_probe());
        let mut events = pool.subscribe();

        pool.submit_named(
            "scan",
            TaskFn::from_async(|ctx: TaskContext| async move {
                for percent in [25, 50, 100] {
                    ctx.report_progress(percent);
                    tokio::task::yield_now().await;
                }
                Ok(serde_json::Value::Null)
            }),
            Priority::Normal,
        );

        let mut progress = Vec::new();
        loop {
            match wait_for(&mut events, |_| true).await {
                PoolEvent::Progress { task_id, percent } => {
                    assert_eq!(task_id, "scan");
                    progress.push(percent);
                }
                PoolEvent::Finished { .. } => break,
                _ => {}
            }
        }
        assert_eq!(progress, vec![25, 50, 100]);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scaling_stays_within_bounds() {
        let probe = idle_probe();
        let pool = start(config(1, 3, 1), Arc::clone(&probe));

        for _ in 0..30 {
            pool.submit(
                TaskFn::blocking(|_| {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(serde_json::Value::Null)
                }),
                Priority::Low,
            );
        }

        assert!(matches!(pool.evaluate_scaling().await, ScalingDecision::Grow { to: 2, .. }));
        assert!(matches!(pool.evaluate_scaling().await, ScalingDecision::Grow { to: 3, .. }));
        assert_eq!(pool.evaluate_scaling().await, ScalingDecision::Hold);
        assert_eq!(pool.worker_count(), 3);

        probe.set_cpu_usage(97.0);
        assert!(matches!(pool.evaluate_scaling().await, ScalingDecision::Shrink { to: 2, .. }));
        assert!(matches!(pool.evaluate_scaling().await, ScalingDecision::Shrink { to: 1, .. }));
        assert_eq!(pool.evaluate_scaling().await, ScalingDecision::Hold);
        assert_eq!(pool.worker_count(), 1);

        let report = pool.performance_report();
        assert_eq!(report.pool.active_workers, 1);
        assert_eq!(report.system.map(|m| m.cpu_usage_percent), Some(97.0));
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_finishes_in_flight_and_drops_queued() {
        let pool = start(config(1, 1, 1), idle_probe());
        let finished = Arc::new(AtomicBool::new(false));
        let second_ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        pool.submit(
            TaskFn::blocking(move |_| {
                std::thread::sleep(Duration::from_millis(150));
                flag.store(true, Ordering::SeqCst);
                Ok(serde_json::Value::Null)
            }),
            Priority::High,
        );
        let flag = Arc::clone(&second_ran);
        pool.submit(
            TaskFn::blocking(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(serde_json::Value::Null)
            }),
            Priority::Low,
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        let dropped = pool.shutdown().await;

        assert!(finished.load(Ordering::SeqCst), "in-flight task must finish");
        assert!(!second_ran.load(Ordering::SeqCst), "no new task may start");
        assert_eq!(dropped, 1);
        assert_eq!(pool.worker_count(), 0);
        // Submit still succeeds after shutdown
        pool.submit(TaskFn::blocking(|_| Ok(serde_json::Value::Null)), Priority::Low);
        assert_eq!(pool.queue_depth(), 1);
    }

    #[tokio::test]
    async fn test_invalid_bounds_rejected() {
        let result = AdaptiveWorkerPool::start(
            config(3, 2, 2),
            idle_probe(),
            Arc::new(SystemTimeProvider),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
