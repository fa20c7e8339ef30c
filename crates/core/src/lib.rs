// Commandeer Core - Domain Logic, Ports & Scheduling Services
// NO infrastructure dependencies: processes, sysinfo and SQLite live behind ports

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::EngineConfig;
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
