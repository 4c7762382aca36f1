use agent_economy_common::config::{default_log_level, default_max_body_bytes, default_request_timeout_ms};
use serde::Deserialize;

fn default_rebuttal_deadline_seconds() -> i64 {
    86_400
}

/// A single configured judge. `Fixed` exists for demo/integration-test
/// determinism (grounded in the Python test suite's `inject_judge` mock,
/// which stands in for a real evaluator without a network round trip);
/// `Http` calls a real pluggable evaluator endpoint with the dispute
/// context and expects a `JudgeVote`-shaped JSON body back.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JudgeConfig {
    Http { url: String },
    Fixed { worker_pct: i64, reasoning: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database_path: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_rebuttal_deadline_seconds")]
    pub rebuttal_deadline_seconds: i64,
    pub identity_url: String,
    pub central_bank_url: String,
    pub task_board_url: String,
    pub reputation_url: String,
    pub platform_agent_id: String,
    pub platform_signing_key_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub downstream_timeout_ms: u64,
    pub judges: Vec<JudgeConfig>,
}
