mod config;
pub mod database;
pub mod persistence;

pub use config::{Config, DisplayConfig, LoggingConfig, StorageConfig, TimerConfig};
pub use database::Database;
pub use persistence::{ExecutionPersistence, MemoryPersistence};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/loopkeeper[-dev]/` based on LOOPKEEPER_ENV.
///
/// Set LOOPKEEPER_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("LOOPKEEPER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("loopkeeper-dev")
    } else {
        base_dir.join("loopkeeper")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
