// Engine configuration
//
// Plain serde structs with documented defaults. Layering (file, env) is the
// daemon's job; services only receive the typed values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bus: BusConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    /// Reject impossible combinations before any service starts
    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.pool.validate()?;
        self.cache.validate()?;
        if self.persistence.enabled && self.persistence.db_path.trim().is_empty() {
            return Err(AppError::Config("persistence.db_path is empty".into()));
        }
        Ok(())
    }
}

/// Command bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub max_concurrent: usize,
    pub default_timeout_secs: u64,
    pub history_limit: usize,
    /// Return code (as reported by the OS) -> extra hint line
    pub exit_code_hints: HashMap<String, String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        let mut exit_code_hints = HashMap::new();
        exit_code_hints.insert(
            "4294967275".to_string(),
            "Executable returned error -21 (possibly needs different parameters or environment)"
                .to_string(),
        );
        Self {
            max_concurrent: 6,
            default_timeout_secs: 30,
            history_limit: 200,
            exit_code_hints,
        }
    }
}

impl BusConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(AppError::Config("bus.max_concurrent must be at least 1".into()));
        }
        if self.default_timeout_secs == 0 {
            return Err(AppError::Config("bus.default_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub initial_workers: usize,
    pub max_retries: u32,
    pub scale_interval_secs: u64,
    pub cpu_high_percent: f32,
    pub cpu_low_percent: f32,
    pub memory_low_percent: f32,
    pub poll_interval_ms: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 4,
            initial_workers: 2,
            max_retries: 2,
            scale_interval_secs: 5,
            cpu_high_percent: 85.0,
            cpu_low_percent: 40.0,
            memory_low_percent: 70.0,
            poll_interval_ms: 1000,
            shutdown_grace_secs: 5,
        }
    }
}

impl PoolConfig {
    pub fn scale_interval(&self) -> Duration {
        Duration::from_secs(self.scale_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.min_workers == 0 {
            return Err(AppError::Config("pool.min_workers must be at least 1".into()));
        }
        if self.min_workers > self.max_workers {
            return Err(AppError::Config(format!(
                "pool.min_workers ({}) exceeds pool.max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        for (name, value) in [
            ("cpu_high_percent", self.cpu_high_percent),
            ("cpu_low_percent", self.cpu_low_percent),
            ("memory_low_percent", self.memory_low_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "pool.{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if self.cpu_low_percent > self.cpu_high_percent {
            return Err(AppError::Config(
                "pool.cpu_low_percent exceeds pool.cpu_high_percent".into(),
            ));
        }
        if self.scale_interval_secs == 0 || self.poll_interval_ms == 0 {
            return Err(AppError::Config("pool intervals must be positive".into()));
        }
        Ok(())
    }
}

/// Base TTL of a category and the multiplier applied on top
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryTtl {
    pub base_secs: f64,
    #[serde(default = "one")]
    pub multiplier: f64,
}

fn one() -> f64 {
    1.0
}

impl CategoryTtl {
    pub fn new(base_secs: f64, multiplier: f64) -> Self {
        Self {
            base_secs,
            multiplier,
        }
    }

    pub fn effective(&self) -> Duration {
        secs_to_duration(self.base_secs * self.multiplier)
    }
}

/// Seconds to a `Duration`, clamped: NaN and negatives give zero, overflow
/// gives `Duration::MAX`
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Finite, non-negative and representable as a `Duration`
fn is_valid_ttl(secs: f64) -> bool {
    Duration::try_from_secs_f64(secs).is_ok()
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl_secs: f64,
    pub categories: HashMap<String, CategoryTtl>,
    pub prefetch: PrefetchConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let categories = [
            ("file_operations", CategoryTtl::new(1.0, 1.0)),
            ("instance_list", CategoryTtl::new(3.0, 1.0)),
            ("instance_status", CategoryTtl::new(3.0, 1.0)),
            ("adb_devices", CategoryTtl::new(5.0, 1.0)),
            ("backend_commands", CategoryTtl::new(30.0, 1.0)),
            ("app_list", CategoryTtl::new(30.0, 3.0)),
            ("system_info", CategoryTtl::new(60.0, 3.0)),
            ("validation", CategoryTtl::new(300.0, 1.0)),
        ]
        .into_iter()
        .map(|(name, ttl)| (name.to_string(), ttl))
        .collect();

        Self {
            max_entries: 100,
            default_ttl_secs: 30.0,
            categories,
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(AppError::Config("cache.max_entries must be at least 1".into()));
        }
        if !is_valid_ttl(self.default_ttl_secs) || self.default_ttl_secs == 0.0 {
            return Err(AppError::Config(format!(
                "cache.default_ttl_secs must be a positive finite number, got {}",
                self.default_ttl_secs
            )));
        }
        if let Some((name, ttl)) = self.categories.iter().find(|(_, ttl)| {
            !is_valid_ttl(ttl.base_secs)
                || !is_valid_ttl(ttl.multiplier)
                || !is_valid_ttl(ttl.base_secs * ttl.multiplier)
        }) {
            return Err(AppError::Config(format!(
                "cache.categories.{} has an invalid TTL ({} s x {})",
                name, ttl.base_secs, ttl.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.prefetch.confidence_threshold) {
            return Err(AppError::Config(
                "cache.prefetch.confidence_threshold must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

/// Predictive prefetch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub confidence_threshold: f64,
    pub max_concurrent: usize,
    pub max_history: usize,
    /// Transitions needed before confidence reaches its raw ratio
    pub min_samples: u32,
    /// Candidates considered per hit
    pub max_candidates: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.7,
            max_concurrent: 3,
            max_history: 1000,
            min_samples: 10,
            max_candidates: 3,
        }
    }
}

/// Cache snapshot persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub db_path: String,
    pub flush_interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "~/.commandeer/cache.db".to_string(),
            flush_interval_secs: 2,
        }
    }
}

impl PersistenceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}
