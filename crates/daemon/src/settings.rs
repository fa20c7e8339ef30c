//! Layered configuration: defaults, then an optional TOML file, then
//! `COMMANDEER__`-prefixed environment variables.

use anyhow::{Context, Result};
use commandeer_core::EngineConfig;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "~/.commandeer/config.toml";
const ENV_PREFIX: &str = "COMMANDEER";

/// Config file location: `COMMANDEER_CONFIG` or the default, tilde-expanded
pub fn config_path() -> PathBuf {
    let raw = std::env::var("COMMANDEER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

/// Load and validate the engine configuration
pub fn load(path: &std::path::Path) -> Result<EngineConfig> {
    let settings = config::Config::builder()
        .add_source(
            config::File::from(path.to_path_buf())
                .format(config::FileFormat::Toml)
                .required(false),
        )
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let mut engine: EngineConfig = settings
        .try_deserialize()
        .context("Invalid configuration")?;
    engine.persistence.db_path = shellexpand::tilde(&engine.persistence.db_path).into_owned();
    engine.validate()?;
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.bus.max_concurrent, 6);
        assert_eq!(config.pool.max_workers, 4);
        assert!(!config.persistence.db_path.starts_with('~'));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[bus]\nmax_concurrent = 2\n\n[pool]\nmax_workers = 8\n\n[cache.prefetch]\nconfidence_threshold = 0.5"
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.bus.max_concurrent, 2);
        assert_eq!(config.bus.default_timeout_secs, 30);
        assert_eq!(config.pool.max_workers, 8);
        assert_eq!(config.cache.prefetch.confidence_threshold, 0.5);
    }

    #[test]
    fn test_invalid_bounds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pool]\nmin_workers = 5\nmax_workers = 2\n").unwrap();
        assert!(load(&path).is_err());
    }
}
