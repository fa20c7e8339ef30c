// Resource-driven scaling decisions

use serde::Serialize;

use super::constants::{GROW_QUEUE_FACTOR, SCALE_STEP};
use crate::config::PoolConfig;
use crate::port::SystemMetrics;

/// Outcome of one scaling evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScalingDecision {
    Grow { to: usize, reason: String },
    Shrink { to: usize, reason: String },
    Hold,
}

/// Pure scaling rule, evaluated by the pool monitor
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    pub min_workers: usize,
    pub max_workers: usize,
    pub cpu_high_percent: f32,
    pub cpu_low_percent: f32,
    pub memory_low_percent: f32,
}

impl ScalingPolicy {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            cpu_high_percent: config.cpu_high_percent,
            cpu_low_percent: config.cpu_low_percent,
            memory_low_percent: config.memory_low_percent,
        }
    }

    /// Clamp a requested worker count into `[min, max]`
    pub fn clamp(&self, workers: usize) -> usize {
        workers.clamp(self.min_workers, self.max_workers)
    }

    /// One step at a time, never leaving `[min, max]`
    pub fn decide(
        &self,
        metrics: &SystemMetrics,
        workers: usize,
        queue_depth: usize,
    ) -> ScalingDecision {
        if workers < self.min_workers {
            return ScalingDecision::Grow {
                to: self.min_workers,
                reason: "below minimum".into(),
            };
        }
        if workers > self.max_workers {
            return ScalingDecision::Shrink {
                to: self.max_workers,
                reason: "above maximum".into(),
            };
        }

        let cpu = metrics.cpu_usage_percent;
        let memory = metrics.memory_usage_percent();

        if cpu > self.cpu_high_percent && workers > self.min_workers {
            return ScalingDecision::Shrink {
                to: workers.saturating_sub(SCALE_STEP).max(self.min_workers),
                reason: format!("high CPU usage: {:.1}%", cpu),
            };
        }

        if cpu < self.cpu_low_percent
            && memory < self.memory_low_percent
            && queue_depth > workers * GROW_QUEUE_FACTOR
            && workers < self.max_workers
        {
            return ScalingDecision::Grow {
                to: (workers + SCALE_STEP).min(self.max_workers),
                reason: format!("queue depth {} with idle resources", queue_depth),
            };
        }

        ScalingDecision::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ScalingPolicy {
        ScalingPolicy::from_config(&PoolConfig {
            min_workers: 1,
            max_workers: 4,
            ..PoolConfig::default()
        })
    }

    fn metrics(cpu: f32, memory_percent: u64) -> SystemMetrics {
        SystemMetrics {
            cpu_usage_percent: cpu,
            memory_used_mb: memory_percent * 10,
            memory_total_mb: 1000,
        }
    }

    #[test]
    fn test_high_cpu_shrinks_by_one() {
        let decision = policy().decide(&metrics(95.0, 50), 3, 100);
        assert!(matches!(decision, ScalingDecision::Shrink { to: 2, .. }));
    }

    #[test]
    fn test_high_cpu_at_floor_holds() {
        assert_eq!(policy().decide(&metrics(95.0, 50), 1, 100), ScalingDecision::Hold);
    }

    #[test]
    fn test_grow_needs_idle_resources_and_backlog() {
        let p = policy();
        assert!(matches!(
            p.decide(&metrics(10.0, 30), 2, 5),
            ScalingDecision::Grow { to: 3, .. }
        ));
        // Backlog not deep enough
        assert_eq!(p.decide(&metrics(10.0, 30), 2, 4), ScalingDecision::Hold);
        // Memory pressure
        assert_eq!(p.decide(&metrics(10.0, 90), 2, 50), ScalingDecision::Hold);
        // CPU in the middle band
        assert_eq!(p.decide(&metrics(60.0, 30), 2, 50), ScalingDecision::Hold);
    }

    #[test]
    fn test_grow_stops_at_ceiling() {
        assert_eq!(policy().decide(&metrics(5.0, 10), 4, 1000), ScalingDecision::Hold);
    }

    #[test]
    fn test_bounds_hold_under_fluctuation() {
        let p = policy();
        let mut workers = 2;
        for step in 0..200 {
            let m = if step % 3 == 0 { metrics(99.0, 20) } else { metrics(1.0, 20) };
            workers = match p.decide(&m, workers, 1000) {
                ScalingDecision::Grow { to, .. } | ScalingDecision::Shrink { to, .. } => {
                    assert!(to.abs_diff(workers) <= 1);
                    to
                }
                ScalingDecision::Hold => workers,
            };
            assert!((1..=4).contains(&workers));
        }
    }
}
