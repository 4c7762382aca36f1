//! Dedicated Task Board client for Court. `agent_economy_common::downstream`
//! collapses every non-2xx response into one configured error, but
//! `file_dispute` needs to tell a genuine 404 (task doesn't exist, pass
//! through as `TASK_NOT_FOUND`) apart from a connection failure or any other
//! Task Board error (`TASK_BOARD_UNAVAILABLE`), so this client is scoped to
//! the court crate rather than shared.

use agent_economy_common::error::{ErrorCode, ServiceError};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TaskBoardClient {
    http: reqwest::Client,
    base_url: String,
}

impl TaskBoardClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> ServiceError {
        tracing::error!(error = %err, "task board unavailable");
        ServiceError::new(ErrorCode::TaskBoardUnavailable, "task board is unavailable")
    }

    /// `None` on a genuine 404; any other failure is `TASK_BOARD_UNAVAILABLE`.
    pub async fn get_task(&self, task_id: &str) -> Result<Option<Value>, ServiceError> {
        let resp = self
            .http
            .get(self.url(&format!("/tasks/{task_id}")))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(self.unavailable(format!("get_task returned {}", resp.status())));
        }
        resp.json().await.map_err(|e| self.unavailable(e))
    }

    pub async fn record_ruling(&self, task_id: &str, token: &str) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(self.url(&format!("/tasks/{task_id}/ruling")))
            .json(&json!({"token": token}))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !resp.status().is_success() {
            return Err(self.unavailable(format!("record_ruling returned {}", resp.status())));
        }
        Ok(())
    }
}
