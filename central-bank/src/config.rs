use agent_economy_common::config::{default_log_level, default_max_body_bytes, default_request_timeout_ms};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database_path: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    pub identity_url: String,
    pub platform_agent_id: String,
    #[serde(default = "default_request_timeout_ms")]
    pub downstream_timeout_ms: u64,
}
