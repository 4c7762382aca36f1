use agent_economy_common::config::{default_log_level, default_max_body_bytes, default_request_timeout_ms};
use serde::Deserialize;

fn default_max_asset_size_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_assets_per_task() -> i64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database_path: String,
    pub storage_root: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_asset_size_bytes")]
    pub max_asset_size_bytes: usize,
    #[serde(default = "default_max_assets_per_task")]
    pub max_assets_per_task: i64,
    pub identity_url: String,
    pub central_bank_url: String,
    pub platform_agent_id: String,
    pub platform_signing_key_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub downstream_timeout_ms: u64,
}
