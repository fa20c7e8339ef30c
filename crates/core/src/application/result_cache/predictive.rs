// Predictive prefetch on top of the result cache
//
// Learns which operation tends to follow which, and after a hit on A warms
// the cache for likely successors B in the background. Prefetch is best
// effort: failures are logged at debug level and never reach the caller.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::debug;

use super::ResultCache;
use crate::config::PrefetchConfig;
use crate::domain::CacheKey;
use crate::error::{AppError, Result};

/// Positional and keyword arguments of one call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallParams {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
struct AccessRecord {
    operation: String,
    timestamp_ms: i64,
}

/// Predicted next operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub operation: String,
    pub confidence: f64,
}

/// Sliding window of accesses with `A -> B` transition counts.
///
/// Counts always describe consecutive pairs inside the window, so they
/// shrink again when old records fall out.
#[derive(Debug)]
pub struct AccessPatternAnalyzer {
    history: VecDeque<AccessRecord>,
    max_history: usize,
    min_samples: u32,
    transitions: HashMap<String, HashMap<String, u32>>,
    last_params: HashMap<String, CallParams>,
}

impl AccessPatternAnalyzer {
    pub fn new(max_history: usize, min_samples: u32) -> Self {
        Self {
            history: VecDeque::new(),
            max_history: max_history.max(2),
            min_samples: min_samples.max(1),
            transitions: HashMap::new(),
            last_params: HashMap::new(),
        }
    }

    pub fn record(&mut self, operation: &str, params: CallParams, timestamp_ms: i64) {
        if let Some(prev) = self.history.back() {
            *self
                .transitions
                .entry(prev.operation.clone())
                .or_default()
                .entry(operation.to_string())
                .or_insert(0) += 1;
        }
        self.last_params.insert(operation.to_string(), params);
        self.history.push_back(AccessRecord {
            operation: operation.to_string(),
            timestamp_ms,
        });

        while self.history.len() > self.max_history {
            if let Some(oldest) = self.history.pop_front() {
                if let Some(next) = self.history.front().map(|r| r.operation.clone()) {
                    self.forget_transition(&oldest.operation, &next);
                }
            }
        }
    }

    fn forget_transition(&mut self, from: &str, to: &str) {
        if let Some(targets) = self.transitions.get_mut(from) {
            if let Some(count) = targets.get_mut(to) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    targets.remove(to);
                }
            }
            if targets.is_empty() {
                self.transitions.remove(from);
            }
        }
    }

    /// observed(A -> B) / observed(A -> *), damped while A has fewer than
    /// `min_samples` outgoing transitions
    pub fn confidence(&self, from: &str, to: &str) -> f64 {
        let Some(targets) = self.transitions.get(from) else {
            return 0.0;
        };
        let total: u32 = targets.values().sum();
        if total == 0 {
            return 0.0;
        }
        let count = targets.get(to).copied().unwrap_or(0);
        let ratio = count as f64 / total as f64;
        let damping = (total as f64 / self.min_samples as f64).min(1.0);
        ratio * damping
    }

    /// Successors of `from` above `threshold`, most confident first
    pub fn predictions(&self, from: &str, threshold: f64, limit: usize) -> Vec<Prediction> {
        let Some(targets) = self.transitions.get(from) else {
            return Vec::new();
        };
        let mut predictions: Vec<Prediction> = targets
            .keys()
            .map(|to| Prediction {
                operation: to.clone(),
                confidence: self.confidence(from, to),
            })
            .filter(|p| p.confidence > threshold)
            .collect();
        predictions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.operation.cmp(&b.operation))
        });
        predictions.truncate(limit);
        predictions
    }

    /// Most recent parameters seen for `operation`
    pub fn last_params(&self, operation: &str) -> Option<&CallParams> {
        self.last_params.get(operation)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Timestamp of the newest record
    pub fn last_access_ms(&self) -> Option<i64> {
        self.history.back().map(|r| r.timestamp_ms)
    }
}

/// Produces a value for an operation when it is prefetched
pub type PrefetchLoader =
    Arc<dyn Fn(CallParams) -> BoxFuture<'static, std::result::Result<Value, String>> + Send + Sync>;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PrefetchStats {
    pub scheduled: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Candidates dropped because the concurrency cap was reached
    pub dropped: u64,
}

#[derive(Default)]
struct PrefetchCounters {
    scheduled: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Result cache with access-pattern driven prefetch
pub struct PredictiveCache {
    cache: ResultCache,
    config: PrefetchConfig,
    analyzer: Mutex<AccessPatternAnalyzer>,
    loaders: RwLock<HashMap<String, PrefetchLoader>>,
    permits: Arc<Semaphore>,
    counters: Arc<PrefetchCounters>,
    runtime: Handle,
}

impl PredictiveCache {
    pub fn new(cache: ResultCache, config: PrefetchConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            AppError::InvalidState(format!("PredictiveCache needs a tokio runtime: {}", e))
        })?;
        Ok(Self {
            analyzer: Mutex::new(AccessPatternAnalyzer::new(
                config.max_history,
                config.min_samples,
            )),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            cache,
            config,
            loaders: RwLock::new(HashMap::new()),
            counters: Arc::new(PrefetchCounters::default()),
            runtime,
        })
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Register how to load `operation` when it is predicted
    pub fn register_loader<F, Fut>(&self, operation: impl Into<String>, loader: F)
    where
        F: Fn(CallParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        let loader: PrefetchLoader = Arc::new(
            move |params: CallParams| -> BoxFuture<'static, std::result::Result<Value, String>> {
                Box::pin(loader(params))
            },
        );
        self.loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation.into(), loader);
    }

    fn lock_analyzer(&self) -> MutexGuard<'_, AccessPatternAnalyzer> {
        self.analyzer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an access without going through the cache
    pub fn record_access(&self, operation: &str, params: CallParams) {
        let now = self.cache.inner.time_provider.now_millis();
        self.lock_analyzer().record(operation, params, now);
    }

    /// Cached lookup that also feeds the access model; a hit may trigger prefetch
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        operation: &str,
        params: CallParams,
        compute: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
    {
        let key = CacheKey::derive(operation, &params.args, &params.kwargs);
        let hit = self.cache.contains(&key);
        self.record_access(operation, params.clone());

        let value = self
            .cache
            .get_or_compute_async(operation, &params.args, &params.kwargs, None, compute)
            .await?;

        if hit && self.config.enabled {
            self.schedule_prefetch(operation);
        }
        Ok(value)
    }

    pub fn predictions(&self, operation: &str) -> Vec<Prediction> {
        self.lock_analyzer().predictions(
            operation,
            self.config.confidence_threshold,
            self.config.max_candidates,
        )
    }

    pub fn prefetch_stats(&self) -> PrefetchStats {
        PrefetchStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Start background loads for confident successors of `operation`.
    /// Returns how many were started.
    pub fn schedule_prefetch(&self, operation: &str) -> usize {
        let candidates: Vec<(Prediction, CallParams)> = {
            let analyzer = self.lock_analyzer();
            analyzer
                .predictions(
                    operation,
                    self.config.confidence_threshold,
                    self.config.max_candidates,
                )
                .into_iter()
                .map(|p| {
                    let params = analyzer
                        .last_params(&p.operation)
                        .cloned()
                        .unwrap_or_default();
                    (p, params)
                })
                .collect()
        };

        let mut started = 0;
        for (prediction, params) in candidates {
            let key = CacheKey::derive(&prediction.operation, &params.args, &params.kwargs);
            if self.cache.contains(&key) {
                continue;
            }
            let loader = self
                .loaders
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&prediction.operation)
                .cloned();
            let Some(loader) = loader else {
                continue;
            };
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(operation = %prediction.operation, "Prefetch dropped: limit reached");
                continue;
            };

            debug!(
                from = %operation,
                operation = %prediction.operation,
                confidence = prediction.confidence,
                "Prefetching"
            );
            self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
            let cache = self.cache.clone();
            let counters = Arc::clone(&self.counters);
            let target = prediction.operation;
            self.runtime.spawn(async move {
                let _permit = permit;
                match loader(params).await {
                    Ok(value) => {
                        cache.set_for_category(key, value, &target);
                        counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        debug!(operation = %target, error = %e, "Prefetch failed");
                    }
                }
            });
            started += 1;
        }
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::port::time_provider::mocks::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    fn train(analyzer: &mut AccessPatternAnalyzer, sequence: &[&str]) {
        for (i, op) in sequence.iter().enumerate() {
            analyzer.record(op, CallParams::default(), i as i64);
        }
    }

    #[test]
    fn test_confidence_is_ratio_damped_by_samples() {
        let mut analyzer = AccessPatternAnalyzer::new(1000, 4);
        train(&mut analyzer, &["list", "status", "list", "status"]);
        // list -> status twice out of two, but only 2 of 4 samples
        assert!((analyzer.confidence("list", "status") - 0.5).abs() < 1e-9);

        train(&mut analyzer, &["list", "status", "list", "status", "list", "apps"]);
        let c_status = analyzer.confidence("list", "status");
        let c_apps = analyzer.confidence("list", "apps");
        assert!(c_status > c_apps);
        assert!(analyzer.confidence("unknown", "status") == 0.0);
    }

    #[test]
    fn test_window_forgets_old_transitions() {
        let mut analyzer = AccessPatternAnalyzer::new(3, 1);
        train(&mut analyzer, &["a", "b", "c", "d", "e"]);
        assert_eq!(analyzer.history_len(), 3);
        assert_eq!(analyzer.confidence("a", "b"), 0.0);
        assert_eq!(analyzer.confidence("c", "d"), 1.0);
        assert_eq!(analyzer.last_access_ms(), Some(4));
    }

    #[test]
    fn test_predictions_sorted_and_limited() {
        let mut analyzer = AccessPatternAnalyzer::new(1000, 1);
        train(&mut analyzer, &["a", "b", "a", "b", "a", "b", "a", "c"]);
        let predictions = analyzer.predictions("a", 0.0, 1);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].operation, "b");
        assert!((predictions[0].confidence - 0.75).abs() < 1e-9);
        assert!(analyzer.predictions("a", 0.9, 3).is_empty());
    }

    fn predictive(config: PrefetchConfig) -> PredictiveCache {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResultCache::new(&CacheConfig::default(), clock);
        PredictiveCache::new(cache, config).unwrap()
    }

    fn eager() -> PrefetchConfig {
        PrefetchConfig {
            min_samples: 1,
            ..PrefetchConfig::default()
        }
    }

    async fn call(p: &PredictiveCache, op: &str) {
        let value: std::result::Result<Value, String> = p
            .get_or_compute(op, CallParams::default(), || async { Ok(json!(op)) })
            .await;
        value.unwrap();
    }

    async fn wait_for(p: &PredictiveCache, done: impl Fn(&PrefetchStats) -> bool) {
        for _ in 0..100 {
            if done(&p.prefetch_stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_hit_prefetches_confident_successor() {
        let p = predictive(eager());
        p.register_loader("instance_status", |_params| async { Ok(json!("prefetched")) });

        call(&p, "instance_list").await;
        call(&p, "instance_status").await;
        p.cache().invalidate_pattern("instance_status");

        // Hit on instance_list; instance_status follows it with confidence 1.0
        call(&p, "instance_list").await;
        wait_for(&p, |s| s.succeeded == 1).await;

        assert_eq!(p.prefetch_stats().succeeded, 1);
        let key = CacheKey::for_operation("instance_status");
        assert_eq!(p.cache().get(&key), Some(json!("prefetched")));
    }

    #[tokio::test]
    async fn test_miss_never_prefetches() {
        let p = predictive(eager());
        p.register_loader("instance_status", |_params| async { Ok(json!(1)) });
        call(&p, "instance_list").await;
        call(&p, "instance_status").await;
        p.cache().invalidate_all();

        call(&p, "instance_list").await;
        assert_eq!(p.prefetch_stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_failed_prefetch_is_silent() {
        let p = predictive(eager());
        p.register_loader("beta", |_params| async { Err("backend down".to_string()) });

        call(&p, "alpha").await;
        call(&p, "beta").await;
        p.cache().invalidate_pattern("beta");
        call(&p, "alpha").await;
        wait_for(&p, |s| s.failed == 1).await;

        assert_eq!(p.prefetch_stats().failed, 1);
        assert!(!p.cache().contains(&CacheKey::for_operation("beta")));
    }

    #[tokio::test]
    async fn test_concurrency_cap_drops_extra_candidates() {
        let p = predictive(PrefetchConfig {
            min_samples: 1,
            max_concurrent: 1,
            confidence_threshold: 0.4,
            ..PrefetchConfig::default()
        });
        let gate = Arc::new(tokio::sync::Notify::new());
        for op in ["b", "c"] {
            let gate = Arc::clone(&gate);
            p.register_loader(op, move |_params| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(json!(null))
                }
            });
        }
        train(&mut p.lock_analyzer(), &["a", "b", "a", "c"]);

        // b and c both follow a with confidence 0.5; only one permit
        assert_eq!(p.predictions("a").len(), 2);
        assert_eq!(p.schedule_prefetch("a"), 1);
        assert_eq!(p.prefetch_stats().dropped, 1);
        gate.notify_waiters();
    }
}
