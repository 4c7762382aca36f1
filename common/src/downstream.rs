//! A thin, generic JSON HTTP client for service-to-service calls (Task Board
//! -> Central Bank, Court -> Central Bank/Task Board/Reputation/judges).
//!
//! Per spec section 4.4, every downstream failure - connection refused,
//! timeout, or the callee's own error envelope - collapses to a single
//! `*_UNAVAILABLE` code for the caller. Callers never forward a callee's
//! internal error code verbatim; only the unavailable-class recovery path
//! is observable, matching Court's all-or-nothing compensating discipline.

use crate::error::{ErrorCode, ServiceError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DownstreamClient {
    http: reqwest::Client,
    base_url: String,
    unavailable: ErrorCode,
}

impl DownstreamClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, unavailable: ErrorCode) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self {
            http,
            base_url: base_url.into(),
            unavailable,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn fail(&self, context: &str, err: impl std::fmt::Display) -> ServiceError {
        tracing::error!(error = %err, context, code = self.unavailable.as_str(), "downstream call failed");
        ServiceError::new(self.unavailable, format!("{context} is unavailable"))
    }

    pub async fn post_json<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ServiceError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.fail(path, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.fail(path, format!("status {status}: {text}")));
        }
        resp.json().await.map_err(|e| self.fail(path, e))
    }

    pub async fn get_json<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, ServiceError> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.fail(path, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.fail(path, format!("status {status}: {text}")));
        }
        resp.json().await.map_err(|e| self.fail(path, e))
    }
}
