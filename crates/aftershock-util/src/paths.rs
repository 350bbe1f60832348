//! Storage directory layout and workload environment
//!
//! A storage directory created by `aftershock init` looks like:
//! - `config.toml`: experiment configuration
//! - `materials/`: workload scripts and anything they need
//! - `history.db`: run history
//! - `00000000/`, `00000001/`, ...: one working directory per run

use std::path::{Path, PathBuf};

/// Environment variable carrying the current run's working directory
pub const WORKING_DIR_ENV: &str = "AFTERSHOCK_WORKING_DIR";

/// Environment variable carrying the materials directory
pub const MATERIALS_DIR_ENV: &str = "AFTERSHOCK_MATERIALS_DIR";

/// Configuration filename within the storage directory
pub const CONFIG_FILENAME: &str = "config.toml";

/// Materials subdirectory name within the storage directory
pub const MATERIALS_DIRNAME: &str = "materials";

/// History database filename within the storage directory
pub const HISTORY_DB_FILENAME: &str = "history.db";

/// Default address the inspector listener binds to
pub const DEFAULT_INSPECTOR_LISTEN: &str = "0.0.0.0:10000";

pub fn config_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(CONFIG_FILENAME)
}

pub fn materials_dir(storage_dir: &Path) -> PathBuf {
    storage_dir.join(MATERIALS_DIRNAME)
}

pub fn history_db_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(HISTORY_DB_FILENAME)
}

/// Working directory for the run with the given index
pub fn working_dir(storage_dir: &Path, run_index: u64) -> PathBuf {
    storage_dir.join(format!("{:08x}", run_index))
}
