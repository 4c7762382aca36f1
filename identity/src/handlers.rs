use crate::{db, state::AppState};
use agent_economy_common::envelope;
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use agent_economy_common::ids::new_agent_id;
use agent_economy_common::extract::Json as ReqJson;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub display_name: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub display_name: String,
    pub public_key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn register_agent(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<RegisterAgentRequest>,
) -> ServiceResult<(axum::http::StatusCode, Json<AgentResponse>)> {
    if req.display_name.trim().is_empty() {
        return Err(ServiceError::new(
            ErrorCode::MissingField,
            "display_name must not be empty",
        ));
    }
    if envelope::parse_public_key(&req.public_key).is_err() {
        return Err(ServiceError::new(
            ErrorCode::InvalidFieldType,
            "public_key must be of the form ed25519:<base64-raw-32-bytes>",
        ));
    }

    let _guard = state.write_lock.lock().await;

    if db::exists_by_name_or_key(&state.writer, &req.display_name, &req.public_key).await? {
        warn!(display_name = %req.display_name, "agent registration rejected, already exists");
        return Err(ServiceError::new(
            ErrorCode::AgentExists,
            "an agent with this display name or public key already exists",
        ));
    }

    let agent_id = new_agent_id();
    let created_at = chrono::Utc::now();
    db::insert_agent(
        &state.writer,
        &agent_id,
        &req.display_name,
        &req.public_key,
        created_at,
    )
    .await?;

    info!(agent_id = %agent_id, "registered agent");

    Ok((
        axum::http::StatusCode::CREATED,
        Json(AgentResponse {
            agent_id,
            display_name: req.display_name,
            public_key: req.public_key,
            created_at,
        }),
    ))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ServiceResult<Json<AgentResponse>> {
    let agent = db::get_agent(&state.reader, &agent_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::AgentNotFound, "agent not found"))?;

    Ok(Json(AgentResponse {
        agent_id: agent.agent_id,
        display_name: agent.display_name,
        public_key: agent.public_key,
        created_at: agent.created_at,
    }))
}

pub async fn list_agents(State(state): State<AppState>) -> ServiceResult<Json<Vec<AgentResponse>>> {
    let agents = db::list_agents(&state.reader).await?;
    Ok(Json(
        agents
            .into_iter()
            .map(|a| AgentResponse {
                agent_id: a.agent_id,
                display_name: a.display_name,
                public_key: a.public_key,
                created_at: a.created_at,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl VerifyResponse {
    fn invalid() -> Self {
        Self {
            valid: false,
            agent_id: None,
            payload: None,
        }
    }
}

/// Verifies a compact signed envelope. Malformed structure, an unknown
/// `kid`, and a bad signature are all folded into `valid: false` - the
/// reason is never disclosed to the caller (spec section 4.1).
pub async fn verify_envelope(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<VerifyRequest>,
) -> Json<VerifyResponse> {
    let decoded = match envelope::decode(&req.token) {
        Ok(decoded) => decoded,
        Err(_) => return Json(VerifyResponse::invalid()),
    };

    let agent = match db::get_agent(&state.reader, &decoded.header.kid).await {
        Ok(Some(agent)) => agent,
        _ => return Json(VerifyResponse::invalid()),
    };

    let verifying_key = match envelope::parse_public_key(&agent.public_key) {
        Ok(key) => key,
        Err(_) => return Json(VerifyResponse::invalid()),
    };

    if !envelope::verify_signature(&decoded, &verifying_key) {
        return Json(VerifyResponse::invalid());
    }

    Json(VerifyResponse {
        valid: true,
        agent_id: Some(agent.agent_id),
        payload: Some(decoded.payload),
    })
}

pub async fn health(State(state): State<AppState>) -> ServiceResult<Json<Value>> {
    let count = db::count_agents(&state.reader).await?;
    Ok(Json(json!({"status": "ok", "agent_count": count})))
}
