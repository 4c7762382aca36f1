//! HTTP client for the Identity service, shared by Central Bank, Task Board,
//! Court, and `agent-cli`. Per spec section 4.1/6.1, Identity is the sole
//! verifier of signed envelopes - every other service hands the raw compact
//! token to `/verify` rather than checking Ed25519 signatures itself.

use crate::error::{ErrorCode, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub display_name: String,
    pub public_key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifiedEnvelope {
    pub agent_id: String,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    agent_id: Option<String>,
    payload: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
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
        tracing::error!(error = %err, "identity service unavailable");
        ServiceError::new(
            ErrorCode::IdentityServiceUnavailable,
            "identity service is unavailable",
        )
    }

    /// Verifies `token` and checks that its `action` matches `expected_action`
    /// (spec section 6.1: cross-endpoint replay is rejected `INVALID_PAYLOAD`).
    pub async fn verify(
        &self,
        token: &str,
        expected_action: &str,
    ) -> Result<VerifiedEnvelope, ServiceError> {
        let resp = self
            .http
            .post(self.url("/verify"))
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !resp.status().is_success() {
            return Err(self.unavailable(format!("verify returned {}", resp.status())));
        }

        let body: VerifyResponse = resp.json().await.map_err(|e| self.unavailable(e))?;

        if !body.valid {
            return Err(ServiceError::new(
                ErrorCode::Forbidden,
                "signed envelope failed verification",
            ));
        }
        let agent_id = body
            .agent_id
            .ok_or_else(|| ServiceError::internal("identity reported valid=true with no agent_id"))?;
        let payload = body
            .payload
            .ok_or_else(|| ServiceError::internal("identity reported valid=true with no payload"))?;

        let action = payload.get("action").and_then(Value::as_str);
        if action != Some(expected_action) {
            return Err(ServiceError::new(
                ErrorCode::InvalidPayload,
                format!("expected action '{expected_action}', got '{action:?}'"),
            ));
        }

        Ok(VerifiedEnvelope { agent_id, payload })
    }

    /// Like [`Self::verify`], but accepts any of `expected_actions` - used by
    /// the two Task Board endpoints that recognize two action names for the
    /// same operation (`dispute_task`/`file_dispute`, `record_ruling`/
    /// `submit_ruling`).
    pub async fn verify_any(
        &self,
        token: &str,
        expected_actions: &[&str],
    ) -> Result<VerifiedEnvelope, ServiceError> {
        let resp = self
            .http
            .post(self.url("/verify"))
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !resp.status().is_success() {
            return Err(self.unavailable(format!("verify returned {}", resp.status())));
        }

        let body: VerifyResponse = resp.json().await.map_err(|e| self.unavailable(e))?;

        if !body.valid {
            return Err(ServiceError::new(
                ErrorCode::Forbidden,
                "signed envelope failed verification",
            ));
        }
        let agent_id = body
            .agent_id
            .ok_or_else(|| ServiceError::internal("identity reported valid=true with no agent_id"))?;
        let payload = body
            .payload
            .ok_or_else(|| ServiceError::internal("identity reported valid=true with no payload"))?;

        let action = payload.get("action").and_then(Value::as_str);
        if !action.is_some_and(|a| expected_actions.contains(&a)) {
            return Err(ServiceError::new(
                ErrorCode::InvalidPayload,
                format!("expected action in {expected_actions:?}, got '{action:?}'"),
            ));
        }

        Ok(VerifiedEnvelope { agent_id, payload })
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, ServiceError> {
        let resp = self
            .http
            .get(self.url(&format!("/agents/{agent_id}")))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(self.unavailable(format!("get_agent returned {}", resp.status())));
        }
        let agent: AgentRecord = resp.json().await.map_err(|e| self.unavailable(e))?;
        Ok(Some(agent))
    }

    pub async fn register(
        &self,
        display_name: &str,
        public_key: &str,
    ) -> Result<AgentRecord, ServiceError> {
        #[derive(Serialize)]
        struct RegisterRequest<'a> {
            display_name: &'a str,
            public_key: &'a str,
        }

        let resp = self
            .http
            .post(self.url("/agents"))
            .json(&RegisterRequest {
                display_name,
                public_key,
            })
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(ServiceError::new(ErrorCode::AgentExists, "agent already exists"));
        }
        if !resp.status().is_success() {
            return Err(self.unavailable(format!("register returned {}", resp.status())));
        }
        resp.json().await.map_err(|e| self.unavailable(e))
    }

    pub async fn health(&self) -> Result<Value, ServiceError> {
        let resp = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        resp.json().await.map_err(|e| self.unavailable(e))
    }
}
