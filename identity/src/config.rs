use agent_economy_common::config::{default_log_level, default_max_body_bytes};
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
}
