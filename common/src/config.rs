//! YAML configuration loading shared by all four services, per spec section
//! 6.4. Each service defines its own settings struct (embedding the fields
//! below) and calls [`load`] with the path from `CONFIG_PATH` (falling back
//! to `./config.yaml`). A missing file or a section that fails to deserialize
//! is a loud startup failure, never a silently-defaulted value.

use serde::de::DeserializeOwned;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "./config.yaml";
pub const CONFIG_PATH_VAR: &str = "CONFIG_PATH";

pub fn config_path() -> PathBuf {
    env::var(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads and deserializes `T` from the YAML file at `path`. Returns a plain
/// `String` describing the failure - the caller logs it with `error!` and
/// exits; see `common::logging::fail_startup`.
pub fn load<T: DeserializeOwned>(path: &std::path::Path) -> Result<T, String> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(true));
    let settings = builder
        .build()
        .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
    settings
        .try_deserialize()
        .map_err(|e| format!("config file {} is missing or malformed: {e}", path.display()))
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_max_body_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

pub fn default_request_timeout_ms() -> u64 {
    5_000
}
