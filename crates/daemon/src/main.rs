//! Commandeer - Main Entry Point
//! Wires the command bus, worker pool and result cache, then runs until Ctrl+C

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commandeer_core::application::{
    AdaptiveWorkerPool, CachePersistence, CommandBus, PredictiveCache, ResultCache,
};
use commandeer_core::domain::{stop_channel, StopToken};
use commandeer_core::port::time_provider::SystemTimeProvider;
use commandeer_core::port::{ExitCodeHintTable, TimeProvider};
use commandeer_core::EngineConfig;
use commandeer_infra_sqlite::{create_pool, run_migrations, SqliteCacheStore};
use commandeer_infra_system::{ProcessRunner, SystemProbeImpl};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging() -> Result<()> {
    let log_format =
        std::env::var("COMMANDEER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("commandeer=info"))
        .context("Failed to create env filter")?;

    let otel = telemetry::otel_layer()?;
    let otel_enabled = otel.is_some();

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(otel)
            .with(fmt::layer().json())
            .try_init()?,
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(otel)
            .with(fmt::layer().pretty())
            .try_init()?,
    }
    telemetry::log_status(otel_enabled);
    Ok(())
}

/// Open the snapshot database and restore the cache from it
async fn start_persistence(
    config: &EngineConfig,
    cache: &ResultCache,
) -> Result<Arc<CachePersistence>> {
    let db_url = format!("sqlite://{}", config.persistence.db_path);
    if let Some(parent) = std::path::Path::new(&config.persistence.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }

    info!(db_path = %config.persistence.db_path, "Opening cache database");
    let pool = create_pool(&db_url).await.context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    let persistence = Arc::new(CachePersistence::new(
        cache.clone(),
        Arc::new(SqliteCacheStore::new(pool)),
        config.persistence.flush_interval(),
    ));
    // Best effort: a broken snapshot must not keep the daemon from starting
    if let Err(e) = persistence.load().await {
        warn!(error = %e, "Cache snapshot could not be restored");
    }
    Ok(persistence)
}

/// Periodic sweep of expired cache entries
fn spawn_housekeeping(cache: ResultCache, mut shutdown: StopToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(HOUSEKEEPING_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let removed = cache.cleanup_expired();
                    let stats = cache.stats();
                    debug!(
                        removed,
                        size = stats.size,
                        hit_rate = stats.hit_rate,
                        evictions = stats.evictions,
                        "Cache housekeeping"
                    );
                }
                _ = shutdown.wait() => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    init_logging()?;
    info!("Commandeer v{} starting...", VERSION);

    // 2. Configuration
    let config_path = settings::config_path();
    let config = settings::load(&config_path)?;
    info!(
        config_path = %config_path.display(),
        max_concurrent = config.bus.max_concurrent,
        min_workers = config.pool.min_workers,
        max_workers = config.pool.max_workers,
        max_entries = config.cache.max_entries,
        "Configuration loaded"
    );

    // 3. Adapters
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let runner = Arc::new(ProcessRunner::new());
    let probe = Arc::new(SystemProbeImpl::new());
    let exit_codes = Arc::new(ExitCodeHintTable::from_config(&config.bus.exit_code_hints));

    // 4. Services
    let bus = CommandBus::new(
        config.bus.clone(),
        runner,
        exit_codes,
        Arc::clone(&time_provider),
    )?;
    let pool = AdaptiveWorkerPool::start(config.pool.clone(), probe, Arc::clone(&time_provider))?;
    let cache = ResultCache::new(&config.cache, Arc::clone(&time_provider));
    let predictive = PredictiveCache::new(cache.clone(), config.cache.prefetch.clone())?;

    let (stop, token) = stop_channel();

    // 5. Cache snapshot
    let persistence_handle = if config.persistence.enabled {
        match start_persistence(&config, &cache).await {
            Ok(persistence) => Some(persistence.spawn(token.clone())),
            Err(e) => {
                error!(error = ?e, "Cache persistence disabled");
                None
            }
        }
    } else {
        None
    };
    let housekeeping = spawn_housekeeping(cache.clone(), token);

    info!(
        cached_entries = predictive.cache().len(),
        workers = pool.worker_count(),
        "System ready. Press Ctrl+C to shutdown"
    );

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    let cancelled = bus.cancel_all();
    let dropped = pool.shutdown().await;
    stop.stop();
    let _ = housekeeping.await;
    if let Some(handle) = persistence_handle {
        let grace = config.pool.shutdown_grace();
        if tokio::time::timeout(grace, handle).await.is_err() {
            warn!("Final cache flush did not finish in time");
        }
    }

    info!(
        cancelled_commands = cancelled,
        dropped_tasks = dropped,
        "Shutdown complete."
    );
    Ok(())
}
