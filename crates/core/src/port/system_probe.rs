// System resource monitoring port
use async_trait::async_trait;
use serde::Serialize;

/// System resource metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

impl SystemMetrics {
    /// Memory usage in percent (0 when the total is unknown)
    pub fn memory_usage_percent(&self) -> f32 {
        if self.memory_total_mb == 0 {
            return 0.0;
        }
        (self.memory_used_mb as f64 / self.memory_total_mb as f64 * 100.0) as f32
    }
}

/// System probe port for resource monitoring
///
/// Drives the worker pool's auto-scaling decisions.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Get current system metrics
    ///
    /// # Example
    /// ```text
    /// let metrics = probe.get_metrics().await;
    /// if metrics.cpu_usage_percent > 85.0 {
    ///     println!("shrink the pool");
    /// }
    /// ```
    async fn get_metrics(&self) -> SystemMetrics;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    /// Mock SystemProbe for testing
    pub struct MockSystemProbe {
        metrics: Arc<Mutex<SystemMetrics>>,
    }
    impl MockSystemProbe {
        /// Probe reporting `cpu_usage_percent` and `memory_percent` of 1000 MB
        pub fn new(cpu_usage_percent: f32, memory_percent: u64) -> Self {
            Self {
                metrics: Arc::new(Mutex::new(SystemMetrics {
                    cpu_usage_percent,
                    memory_used_mb: memory_percent * 10,
                    memory_total_mb: 1000,
                })),
            }
        }
        pub fn set_cpu_usage(&self, cpu_usage_percent: f32) {
            self.metrics.lock().unwrap().cpu_usage_percent = cpu_usage_percent;
        }
        pub fn set_memory_percent(&self, memory_percent: u64) {
            self.metrics.lock().unwrap().memory_used_mb = memory_percent * 10;
        }
    }
    #[async_trait]
    impl SystemProbe for MockSystemProbe {
        async fn get_metrics(&self) -> SystemMetrics {
            self.metrics.lock().unwrap().clone()
        }
    }
}
