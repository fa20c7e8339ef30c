// System probe implementation
// reason: sysinfo for cross-platform CPU and memory readings
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

use commandeer_core::port::system_probe::{SystemMetrics, SystemProbe};

/// System probe backed by sysinfo
///
/// CPU usage is computed between two refreshes, so the first reading after
/// construction may be zero.
pub struct SystemProbeImpl {
    system: Mutex<System>,
}

impl SystemProbeImpl {
    pub fn new() -> Self {
        let refresh = RefreshKind::new()
            .with_cpu(CpuRefreshKind::new().with_cpu_usage())
            .with_memory(MemoryRefreshKind::new().with_ram());
        Self {
            system: Mutex::new(System::new_with_specifics(refresh)),
        }
    }
}

impl Default for SystemProbeImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SystemProbeImpl {
    async fn get_metrics(&self) -> SystemMetrics {
        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);

        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let metrics = SystemMetrics {
            cpu_usage_percent: sys.global_cpu_info().cpu_usage().clamp(0.0, 100.0),
            memory_used_mb: sys.used_memory() / 1024 / 1024,
            memory_total_mb: sys.total_memory() / 1024 / 1024,
        };

        debug!(
            cpu = %metrics.cpu_usage_percent,
            mem_used_mb = %metrics.memory_used_mb,
            mem_total_mb = %metrics.memory_total_mb,
            "System metrics collected"
        );
        metrics
    }
}
