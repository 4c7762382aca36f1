//! HTTP client for the reputation feedback recorder. Court is the only
//! caller: `execute_ruling` submits two `submit_feedback` envelopes (one per
//! party) after `escrow_split` succeeds and before `record_ruling`. The
//! reputation service itself is out of scope, so this client only needs the
//! one call, unlike `CentralBankClient`/`IdentityClient`'s wider surface.

use crate::error::{ErrorCode, ServiceError};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct FeedbackRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Clone)]
pub struct ReputationClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReputationClient {
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

    pub async fn record_feedback(&self, token: &str) -> Result<Value, ServiceError> {
        let resp = self
            .http
            .post(self.url("/feedback"))
            .json(&FeedbackRequest { token })
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("status {status}: {text}")));
        }
        resp.json().await.map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> ServiceError {
        tracing::error!(error = %err, "reputation service unavailable");
        ServiceError::new(
            ErrorCode::ReputationServiceUnavailable,
            "reputation service is unavailable",
        )
    }
}
