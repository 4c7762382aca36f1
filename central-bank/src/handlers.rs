use crate::payloads::{
    CreateAccountPayload, CreditPayload, EscrowLockPayload, EscrowReleasePayload, EscrowSplitPayload,
    ACTION_CREATE_ACCOUNT, ACTION_CREDIT, ACTION_ESCROW_LOCK, ACTION_ESCROW_RELEASE, ACTION_ESCROW_SPLIT,
};
use crate::{db, state::AppState};
use agent_economy_common::bearer;
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use agent_economy_common::extract::Json as ReqJson;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

#[derive(serde::Deserialize)]
pub struct EnvelopeRequest {
    pub token: String,
}

fn is_platform(state: &AppState, agent_id: &str) -> bool {
    agent_id == state.platform_agent_id
}

pub async fn create_account(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<EnvelopeRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), ServiceError> {
    let verified = state.identity.verify(&req.token, ACTION_CREATE_ACCOUNT).await?;
    let payload: CreateAccountPayload = serde_json::from_value(verified.payload.clone())
        .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("malformed payload: {e}")))?;

    let platform = is_platform(&state, &verified.agent_id);
    if !platform {
        if verified.agent_id != payload.account_id {
            return Err(ServiceError::new(
                ErrorCode::Forbidden,
                "a non-platform agent may only create its own account",
            ));
        }
        if payload.initial_balance != 0 {
            return Err(ServiceError::new(
                ErrorCode::Forbidden,
                "self-serve account creation must start at zero balance",
            ));
        }
    }
    if payload.initial_balance < 0 {
        return Err(ServiceError::new(ErrorCode::InvalidPayload, "initial_balance must be non-negative"));
    }
    if platform && state.identity.get_agent(&payload.account_id).await?.is_none() {
        return Err(ServiceError::new(ErrorCode::AgentNotFound, "no such agent is registered"));
    }

    let _guard = state.write_lock.lock().await;
    let account = db::create_account(&state.writer, &payload.account_id, payload.initial_balance).await?;
    info!(account_id = %account.account_id, "account created");
    Ok((axum::http::StatusCode::CREATED, Json(json!(account))))
}

pub async fn credit(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<EnvelopeRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_CREDIT).await?;
    if !is_platform(&state, &verified.agent_id) {
        return Err(ServiceError::new(ErrorCode::Forbidden, "credit is platform-only"));
    }
    let payload: CreditPayload = serde_json::from_value(verified.payload.clone())
        .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("malformed payload: {e}")))?;
    if payload.amount <= 0 {
        return Err(ServiceError::new(ErrorCode::InvalidPayload, "amount must be positive"));
    }

    let _guard = state.write_lock.lock().await;
    let tx = db::credit(&state.writer, &payload.account_id, payload.amount, &payload.reference).await?;
    Ok(Json(json!(tx)))
}

async fn authorize_read(state: &AppState, headers: &HeaderMap, account_id: &str) -> ServiceResult<()> {
    let token = bearer::extract(headers)?;
    let verified = state.identity.verify(&token, "read_account").await?;
    if is_platform(state, &verified.agent_id) || verified.agent_id == account_id {
        Ok(())
    } else {
        Err(ServiceError::new(ErrorCode::Forbidden, "not authorized to read this account"))
    }
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> ServiceResult<Json<Value>> {
    authorize_read(&state, &headers, &account_id).await?;
    let account = db::get_account(&state.reader, &account_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::AccountNotFound, "account not found"))?;
    Ok(Json(json!(account)))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> ServiceResult<Json<Value>> {
    authorize_read(&state, &headers, &account_id).await?;
    if db::get_account(&state.reader, &account_id).await?.is_none() {
        return Err(ServiceError::new(ErrorCode::AccountNotFound, "account not found"));
    }
    let transactions = db::list_transactions(&state.reader, &account_id).await?;
    Ok(Json(json!(transactions)))
}

pub async fn escrow_lock(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<EnvelopeRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), ServiceError> {
    let verified = state.identity.verify(&req.token, ACTION_ESCROW_LOCK).await?;
    let payload: EscrowLockPayload = serde_json::from_value(verified.payload.clone())
        .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("malformed payload: {e}")))?;
    if verified.agent_id != payload.payer_account_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "escrow_lock must be signed by the payer"));
    }
    if payload.amount <= 0 {
        return Err(ServiceError::new(ErrorCode::InvalidPayload, "amount must be positive"));
    }

    let _guard = state.write_lock.lock().await;
    let escrow = db::escrow_lock(&state.writer, &payload.payer_account_id, &payload.task_id, payload.amount)
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(json!(escrow))))
}

pub async fn escrow_release(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<EnvelopeRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_ESCROW_RELEASE).await?;
    if !is_platform(&state, &verified.agent_id) {
        return Err(ServiceError::new(ErrorCode::Forbidden, "escrow_release is platform-only"));
    }
    let payload: EscrowReleasePayload = serde_json::from_value(verified.payload.clone())
        .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("malformed payload: {e}")))?;

    let _guard = state.write_lock.lock().await;
    let escrow = db::escrow_release(&state.writer, &payload.escrow_id, &payload.recipient_account_id).await?;
    Ok(Json(json!(escrow)))
}

pub async fn escrow_split(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<EnvelopeRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_ESCROW_SPLIT).await?;
    if !is_platform(&state, &verified.agent_id) {
        return Err(ServiceError::new(ErrorCode::Forbidden, "escrow_split is platform-only"));
    }
    let payload: EscrowSplitPayload = serde_json::from_value(verified.payload.clone())
        .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("malformed payload: {e}")))?;

    let _guard = state.write_lock.lock().await;
    let escrow = db::escrow_split(
        &state.writer,
        &payload.escrow_id,
        payload.worker_pct,
        &payload.worker_account_id,
        &payload.poster_account_id,
    )
    .await?;
    Ok(Json(json!(escrow)))
}

pub async fn health(State(state): State<AppState>) -> ServiceResult<Json<Value>> {
    let accounts = db::count_accounts(&state.reader).await?;
    let escrowed = db::total_escrowed(&state.reader).await?;
    Ok(Json(agent_economy_common::health::health_body(vec![
        ("accounts", json!(accounts)),
        ("total_escrowed", json!(escrowed)),
    ])))
}
