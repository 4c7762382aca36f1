//! HTTP client for Central Bank, shared by Task Board and Court. Every
//! network or non-2xx failure collapses to `CENTRAL_BANK_UNAVAILABLE`, except
//! `escrow_lock`'s insufficient-funds case, which Central Bank reports
//! distinctly and which callers must surface as `INSUFFICIENT_FUNDS` rather
//! than a generic outage.

use crate::error::{ErrorCode, ServiceError};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CentralBankClient {
    http: reqwest::Client,
    base_url: String,
}

impl CentralBankClient {
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
        tracing::error!(error = %err, "central bank unavailable");
        ServiceError::new(ErrorCode::CentralBankUnavailable, "central bank is unavailable")
    }

    async fn post_token(&self, path: &str, token: &str) -> Result<Value, ServiceError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(&json!({"token": token}))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if resp.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(ServiceError::new(
                ErrorCode::InsufficientFunds,
                "poster has insufficient funds to cover the task reward",
            ));
        }
        if !resp.status().is_success() {
            return Err(self.unavailable(format!("{path} returned {}", resp.status())));
        }
        resp.json().await.map_err(|e| self.unavailable(e))
    }

    pub async fn escrow_lock(&self, token: &str) -> Result<Value, ServiceError> {
        self.post_token("/escrow", token).await
    }

    pub async fn escrow_release(&self, token: &str) -> Result<Value, ServiceError> {
        self.post_token("/escrow/release", token).await
    }

    pub async fn escrow_split(&self, token: &str) -> Result<Value, ServiceError> {
        self.post_token("/escrow/split", token).await
    }
}
