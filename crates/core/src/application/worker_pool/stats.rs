// Worker performance accounting

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::port::SystemMetrics;

/// Accumulators for one worker, updated only after a task attempt completes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Running average over every finished attempt
    pub avg_duration_ms: f64,
    pub total_duration_ms: u64,
    pub started_at_ms: i64,
    pub last_task_at_ms: Option<i64>,
}

impl WorkerStats {
    pub fn new(worker_id: usize, now_ms: i64) -> Self {
        Self {
            worker_id,
            tasks_completed: 0,
            tasks_failed: 0,
            avg_duration_ms: 0.0,
            total_duration_ms: 0,
            started_at_ms: now_ms,
            last_task_at_ms: None,
        }
    }

    pub fn record(&mut self, duration: Duration, success: bool, now_ms: i64) {
        if success {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let millis = duration.as_secs_f64() * 1000.0;
        let n = self.total_tasks() as f64;
        self.avg_duration_ms += (millis - self.avg_duration_ms) / n;
        self.total_duration_ms += duration.as_millis() as u64;
        self.last_task_at_ms = Some(now_ms);
    }

    pub fn total_tasks(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    pub fn uptime(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.started_at_ms).max(0) as u64)
    }

    pub fn tasks_per_minute(&self, now_ms: i64) -> f64 {
        per_minute(self.tasks_completed, self.uptime(now_ms))
    }

    /// Percentage of attempts that succeeded (100 when idle)
    pub fn success_rate(&self) -> f64 {
        success_rate(self.tasks_completed, self.total_tasks())
    }

    pub fn report(&self, now_ms: i64) -> WorkerReport {
        WorkerReport {
            worker_id: self.worker_id,
            tasks_completed: self.tasks_completed,
            tasks_failed: self.tasks_failed,
            avg_duration_ms: self.avg_duration_ms,
            uptime_secs: self.uptime(now_ms).as_secs_f64(),
            tasks_per_minute: self.tasks_per_minute(now_ms),
            success_rate: self.success_rate(),
        }
    }
}

fn per_minute(count: u64, uptime: Duration) -> f64 {
    let minutes = uptime.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    count as f64 / minutes
}

fn success_rate(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Stats of every live worker plus totals of retired ones
#[derive(Debug, Default)]
pub struct StatsRegistry {
    live: BTreeMap<usize, WorkerStats>,
    retired_completed: u64,
    retired_failed: u64,
    retired_duration_ms: u64,
}

impl StatsRegistry {
    pub fn register(&mut self, worker_id: usize, now_ms: i64) {
        self.live.insert(worker_id, WorkerStats::new(worker_id, now_ms));
    }

    pub fn record(&mut self, worker_id: usize, duration: Duration, success: bool, now_ms: i64) {
        if let Some(stats) = self.live.get_mut(&worker_id) {
            stats.record(duration, success, now_ms);
        }
    }

    /// Fold a departing worker into the aggregate
    pub fn retire(&mut self, worker_id: usize) {
        if let Some(stats) = self.live.remove(&worker_id) {
            self.retired_completed += stats.tasks_completed;
            self.retired_failed += stats.tasks_failed;
            self.retired_duration_ms += stats.total_duration_ms;
        }
    }

    pub fn workers(&self, now_ms: i64) -> Vec<WorkerReport> {
        self.live.values().map(|s| s.report(now_ms)).collect()
    }

    pub fn aggregate(&self, pool_started_at_ms: i64, now_ms: i64) -> AggregateStats {
        let completed =
            self.retired_completed + self.live.values().map(|s| s.tasks_completed).sum::<u64>();
        let failed = self.retired_failed + self.live.values().map(|s| s.tasks_failed).sum::<u64>();
        let duration_ms =
            self.retired_duration_ms + self.live.values().map(|s| s.total_duration_ms).sum::<u64>();
        let total = completed + failed;
        let uptime = Duration::from_millis(now_ms.saturating_sub(pool_started_at_ms).max(0) as u64);

        AggregateStats {
            tasks_completed: completed,
            tasks_failed: failed,
            avg_duration_ms: if total == 0 {
                0.0
            } else {
                duration_ms as f64 / total as f64
            },
            uptime_secs: uptime.as_secs_f64(),
            tasks_per_minute: per_minute(completed, uptime),
            success_rate: success_rate(completed, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_duration_ms: f64,
    pub uptime_secs: f64,
    pub tasks_per_minute: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_duration_ms: f64,
    pub uptime_secs: f64,
    pub tasks_per_minute: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub active_workers: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub busy_workers: usize,
    pub queued_tasks: usize,
    pub utilisation_percent: f64,
}

/// Snapshot returned by `AdaptiveWorkerPool::performance_report`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub workers: Vec<WorkerReport>,
    pub aggregate: AggregateStats,
    pub pool: PoolStatus,
    pub system: Option<SystemMetrics>,
}
