//! Pluggable dispute evaluators. `dispute_service.py`'s `Judge` is a
//! `Protocol` with one async `evaluate(context) -> JudgeVote` method and two
//! concrete implementations (`HttpJudge`, `FixedJudge`); the teacher
//! workspace has no `async_trait` dependency anywhere, so the same shape is
//! expressed here as an enum with an inherent async method rather than a
//! trait object.

use crate::config::JudgeConfig;
use crate::payloads::ACTION_EXECUTE_RULING;
use agent_economy_common::error::{ErrorCode, ServiceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything a judge needs to rule on a dispute, mirroring
/// `dispute_service.py`'s `DisputeContext` dataclass field for field.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeContext<'a> {
    pub dispute_id: &'a str,
    pub task_id: &'a str,
    pub task_title: &'a str,
    pub task_spec: &'a str,
    pub reward: i64,
    pub claim: &'a str,
    pub rebuttal: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeVote {
    #[serde(default)]
    pub judge_id: Option<String>,
    pub worker_pct: i64,
    pub reasoning: String,
    #[serde(default)]
    pub voted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpJudgeResponse {
    worker_pct: i64,
    reasoning: String,
}

impl JudgeConfig {
    /// Evaluates the dispute and returns a vote normalized with `judge_id`
    /// defaulted to `judge-{index}` and `voted_at` defaulted to `now`, and
    /// validated against the invariants every vote must satisfy regardless
    /// of source.
    pub async fn evaluate(
        &self,
        index: usize,
        context: &DisputeContext<'_>,
        http: &reqwest::Client,
        now: DateTime<Utc>,
    ) -> Result<JudgeVote, ServiceError> {
        let judge_id = format!("judge-{index}");
        let raw = match self {
            JudgeConfig::Fixed {
                worker_pct,
                reasoning,
            } => JudgeVote {
                judge_id: Some(judge_id.clone()),
                worker_pct: *worker_pct,
                reasoning: reasoning.clone(),
                voted_at: Some(now),
            },
            JudgeConfig::Http { url } => {
                let resp = http
                    .post(url)
                    .json(&serde_json::json!({
                        "action": ACTION_EXECUTE_RULING,
                        "context": context,
                    }))
                    .send()
                    .await
                    .map_err(|e| unavailable(&judge_id, e))?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    return Err(unavailable(&judge_id, format!("judge responded with {status}")));
                }

                let body: HttpJudgeResponse = resp
                    .json()
                    .await
                    .map_err(|e| unavailable(&judge_id, e))?;

                JudgeVote {
                    judge_id: Some(judge_id.clone()),
                    worker_pct: body.worker_pct,
                    reasoning: body.reasoning,
                    voted_at: Some(now),
                }
            }
        };

        validate(&judge_id, &raw)?;
        Ok(raw)
    }
}

fn validate(judge_id: &str, vote: &JudgeVote) -> Result<(), ServiceError> {
    if !(0..=100).contains(&vote.worker_pct) {
        tracing::warn!(judge_id, worker_pct = vote.worker_pct, "judge returned out-of-range worker_pct");
        return Err(ServiceError::new(
            ErrorCode::JudgeUnavailable,
            "judge returned an out-of-range worker_pct",
        ));
    }
    if vote.reasoning.trim().is_empty() {
        tracing::warn!(judge_id, "judge returned empty reasoning");
        return Err(ServiceError::new(
            ErrorCode::JudgeUnavailable,
            "judge returned empty reasoning",
        ));
    }
    Ok(())
}

fn unavailable(judge_id: &str, err: impl std::fmt::Display) -> ServiceError {
    tracing::error!(judge_id, error = %err, "judge unavailable");
    ServiceError::new(ErrorCode::JudgeUnavailable, "a judge is unavailable")
}

/// Builds the shared HTTP client judges are evaluated through.
pub fn build_judge_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client builds with a valid timeout")
}
