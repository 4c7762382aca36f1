//! All ten Task Board endpoints, carrying the fixed error-ordering and
//! two-stage signer checks captured from `task_manager.py`: a payload-level
//! check (signer against a claimed identity field in the envelope) runs
//! before the resource lookup, and for most mutating endpoints a second
//! resource-level check (signer against the loaded task's actual owner/
//! worker) runs again after the status check. `submit_bid` only has the
//! payload-level check plus `SELF_BID`; `record_ruling` and asset upload
//! never evaluate the lazy deadline, since neither acts on a deadline-bound
//! status transition.

use crate::escrow_coordinator::EscrowCoordinator;
use crate::models::{Task, TaskStatus};
use crate::payloads::{
    ACTION_ACCEPT_BID, ACTION_APPROVE_TASK, ACTION_CANCEL_TASK, ACTION_CREATE_TASK,
    ACTION_DISPUTE_TASK, ACTION_FILE_DISPUTE, ACTION_LIST_BIDS, ACTION_RECORD_RULING,
    ACTION_SUBMIT_BID, ACTION_SUBMIT_DELIVERABLE, ACTION_SUBMIT_RULING,
};
use crate::{asset_manager, db, deadlines, state::AppState};
use agent_economy_common::bearer;
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use agent_economy_common::extract::Json as ReqJson;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

const TASK_ID_PATTERN_HELP: &str = "task_id must match the format t-<uuid4>";

fn task_id_is_valid(task_id: &str) -> bool {
    let Some(rest) = task_id.strip_prefix("t-") else { return false };
    uuid::Uuid::parse_str(rest).is_ok()
}

fn positive_int(value: &Value) -> Option<i64> {
    value.as_i64().filter(|n| *n > 0)
}

fn worker_pct_value(value: &Value) -> Option<i64> {
    value.as_i64().filter(|n| (0..=100).contains(n))
}

fn require_field<'a>(payload: &'a Value, field: &str) -> ServiceResult<&'a Value> {
    payload
        .get(field)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidPayload, format!("missing required field: {field}")))
}

fn require_str_field<'a>(payload: &'a Value, field: &str) -> ServiceResult<&'a str> {
    require_field(payload, field)?
        .as_str()
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidPayload, format!("{field} must be a string")))
}

fn require_path_match(payload: &Value, field: &str, path_value: &str) -> ServiceResult<()> {
    let value = require_str_field(payload, field)?;
    if value != path_value {
        return Err(ServiceError::new(
            ErrorCode::InvalidPayload,
            format!("{field} in payload does not match URL path"),
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub task_token: String,
    pub escrow_token: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

pub async fn create_task(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<CreateTaskRequest>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let verified = state.identity.verify(&req.task_token, ACTION_CREATE_TASK).await?;
    let payload = &verified.payload;
    let signer_id = &verified.agent_id;

    for field in ["task_id", "poster_id", "title", "spec", "reward", "bidding_deadline_seconds", "review_deadline_seconds"] {
        require_field(payload, field)?;
    }
    let deadline_seconds_value = payload
        .get("deadline_seconds")
        .or_else(|| payload.get("execution_deadline_seconds"))
        .ok_or_else(|| {
            ServiceError::new(ErrorCode::InvalidPayload, "missing required field: execution_deadline_seconds")
        })?;

    let poster_id = require_str_field(payload, "poster_id")?;
    if signer_id != poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match poster_id"));
    }

    let task_id = require_str_field(payload, "task_id")?;
    if !task_id_is_valid(task_id) {
        return Err(ServiceError::new(ErrorCode::InvalidTaskId, TASK_ID_PATTERN_HELP));
    }

    let title = require_str_field(payload, "title")?;
    if title.is_empty() {
        return Err(ServiceError::new(ErrorCode::InvalidPayload, "title must be a non-empty string"));
    }
    if title.chars().count() > 200 {
        return Err(ServiceError::new(ErrorCode::TitleTooLong, "title must not exceed 200 characters"));
    }

    let spec = require_str_field(payload, "spec")?;
    if spec.is_empty() || spec.chars().count() > 10_000 {
        return Err(ServiceError::new(
            ErrorCode::InvalidPayload,
            "spec must be between 1 and 10,000 characters",
        ));
    }

    let reward = positive_int(require_field(payload, "reward")?)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidReward, "reward must be a positive integer"))?;
    let bidding_deadline_seconds = positive_int(require_field(payload, "bidding_deadline_seconds")?)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidDeadline, "bidding_deadline_seconds must be a positive integer"))?;
    let deadline_seconds = positive_int(deadline_seconds_value)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidDeadline, "deadline_seconds must be a positive integer"))?;
    let review_deadline_seconds = positive_int(require_field(payload, "review_deadline_seconds")?)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidDeadline, "review_deadline_seconds must be a positive integer"))?;

    let escrow = agent_economy_common::envelope::decode(&req.escrow_token)
        .map_err(|e| ServiceError::new(ErrorCode::TokenMismatch, format!("escrow_token is malformed: {e}")))?;
    let escrow_task_id = escrow.payload.get("task_id").and_then(Value::as_str);
    let escrow_amount = escrow.payload.get("amount").and_then(Value::as_i64);
    let (Some(escrow_task_id), Some(escrow_amount)) = (escrow_task_id, escrow_amount) else {
        return Err(ServiceError::new(
            ErrorCode::TokenMismatch,
            "escrow token payload must include task_id and amount",
        ));
    };
    if escrow_task_id != task_id {
        return Err(ServiceError::new(ErrorCode::TokenMismatch, "task_id mismatch between task_token and escrow_token"));
    }
    if escrow_amount != reward {
        return Err(ServiceError::new(ErrorCode::TokenMismatch, "reward/amount mismatch between task_token and escrow_token"));
    }
    if escrow.header.kid != *signer_id {
        return Err(ServiceError::new(ErrorCode::TokenMismatch, "escrow signer does not match task signer"));
    }
    if let Some(escrow_agent_id) = escrow.payload.get("agent_id").and_then(Value::as_str) {
        if escrow_agent_id != poster_id {
            return Err(ServiceError::new(ErrorCode::TokenMismatch, "escrow signer agent_id does not match poster_id"));
        }
    }

    if db::get_task(&state.reader, task_id).await?.is_some() {
        return Err(ServiceError::new(
            ErrorCode::TaskAlreadyExists,
            format!("a task with task_id '{task_id}' already exists"),
        ));
    }

    let escrow_result = state.central_bank.escrow_lock(&req.escrow_token).await?;
    let escrow_id = escrow_result
        .get("escrow_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::internal("central bank reported no escrow_id on lock"))?
        .to_string();

    let _guard = state.write_lock.lock().await;
    let new_task = db::NewTask {
        task_id,
        poster_id,
        title,
        spec,
        reward,
        bidding_deadline_seconds,
        deadline_seconds,
        review_deadline_seconds,
        escrow_id: &escrow_id,
    };
    let task = match db::insert_task(&state.writer, new_task).await {
        Ok(task) => task,
        Err(e) => {
            let coordinator = EscrowCoordinator { central_bank: &state.central_bank, signer: &state.platform_signer };
            if let Err(release_err) = coordinator.release_escrow(&escrow_id, poster_id).await {
                tracing::error!(task_id, escrow_id, error = %release_err, "failed to release escrow during rollback");
            }
            return Err(e);
        }
    };

    Ok((StatusCode::CREATED, Json(json!(task.to_response()))))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ServiceResult<Json<Value>> {
    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    Ok(Json(json!(task.to_response())))
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub poster_id: Option<String>,
    pub worker_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(q): Query<ListTasksQuery>,
) -> ServiceResult<Json<Value>> {
    let tasks = db::list_tasks(
        &state.reader,
        db::TaskFilter { status: q.status, poster_id: q.poster_id, worker_id: q.worker_id, limit: q.limit, offset: q.offset },
    )
    .await?;

    let mut summaries = Vec::with_capacity(tasks.len());
    for task in tasks {
        let task = deadlines::evaluate(&state, task).await?;
        summaries.push(task.to_summary());
    }
    Ok(Json(json!({"tasks": summaries})))
}

async fn load_task(state: &AppState, task_id: &str) -> ServiceResult<Task> {
    db::get_task(&state.reader, task_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::TaskNotFound, "task not found"))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_CANCEL_TASK).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;
    let poster_id = require_str_field(payload, "poster_id")?;
    if verified.agent_id != poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match poster_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Open {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot cancel task in '{}' status, must be 'open'", task.status.as_str()),
        ));
    }
    if verified.agent_id != task.poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the poster can cancel this task"));
    }

    let coordinator = EscrowCoordinator { central_bank: &state.central_bank, signer: &state.platform_signer };
    coordinator.release_escrow(&task.escrow_id, &task.poster_id).await?;

    let _guard = state.write_lock.lock().await;
    db::mark_cancelled(&state.writer, &task_id).await?;
    let updated = load_task(&state, &task_id).await?;
    Ok(Json(json!(updated.to_response())))
}

pub async fn submit_bid(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_SUBMIT_BID).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;
    let bidder_id = require_str_field(payload, "bidder_id")?.to_string();
    let amount = positive_int(require_field(payload, "amount")?)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidReward, "bid amount must be a positive integer"))?;
    if verified.agent_id != bidder_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match bidder_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Open {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot bid on task in '{}' status, must be 'open'", task.status.as_str()),
        ));
    }
    if bidder_id == task.poster_id {
        return Err(ServiceError::new(ErrorCode::SelfBid, "cannot bid on your own task"));
    }

    let _guard = state.write_lock.lock().await;
    let bid_id = format!("bid-{}", uuid::Uuid::new_v4());
    let bid = db::insert_bid(&state.writer, &bid_id, &task_id, &bidder_id, amount).await?;
    Ok(Json(json!(bid)))
}

pub async fn list_bids(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> ServiceResult<Json<Value>> {
    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;

    if task.status == TaskStatus::Open {
        if !headers.contains_key(header::AUTHORIZATION) {
            return Err(ServiceError::new(
                ErrorCode::InvalidJws,
                "authorization required to list bids during open phase",
            ));
        }
        let token = bearer::extract(&headers)?;
        let verified = state.identity.verify(&token, ACTION_LIST_BIDS).await?;
        if let Some(payload_task_id) = verified.payload.get("task_id").and_then(Value::as_str) {
            if payload_task_id != task_id {
                return Err(ServiceError::new(ErrorCode::InvalidPayload, "task_id in payload does not match URL path"));
            }
        }
        if let Some(payload_poster_id) = verified.payload.get("poster_id").and_then(Value::as_str) {
            if verified.agent_id != payload_poster_id {
                return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match poster_id"));
            }
        }
        if verified.agent_id != task.poster_id {
            return Err(ServiceError::new(ErrorCode::Forbidden, "only the poster can list bids during open phase"));
        }
    }

    let bids = db::get_bids_for_task(&state.reader, &task_id).await?;
    Ok(Json(json!({"task_id": task_id, "bids": bids})))
}

pub async fn accept_bid(
    State(state): State<AppState>,
    Path((task_id, bid_id)): Path<(String, String)>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_ACCEPT_BID).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;
    require_path_match(payload, "bid_id", &bid_id)?;
    let poster_id = require_str_field(payload, "poster_id")?;
    if verified.agent_id != poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match poster_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Open {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot accept bid on task in '{}' status, must be 'open'", task.status.as_str()),
        ));
    }
    if verified.agent_id != task.poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the poster can accept bids"));
    }

    let bid = db::get_bid(&state.reader, &bid_id, &task_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::BidNotFound, "bid not found"))?;

    let _guard = state.write_lock.lock().await;
    db::mark_accepted(&state.writer, &task_id, &bid.bidder_id, &bid_id).await?;
    let updated = load_task(&state, &task_id).await?;
    Ok(Json(json!(updated.to_response())))
}

pub async fn submit_deliverable(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_SUBMIT_DELIVERABLE).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;
    let worker_id = require_str_field(payload, "worker_id")?;
    if verified.agent_id != worker_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match worker_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Accepted {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot submit deliverable for task in '{}' status, must be 'accepted'", task.status.as_str()),
        ));
    }
    if Some(verified.agent_id.as_str()) != task.worker_id.as_deref() {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the assigned worker can submit deliverables"));
    }

    if db::count_assets(&state.reader, &task_id).await? == 0 {
        return Err(ServiceError::new(ErrorCode::NoAssets, "at least one asset must be uploaded before submitting"));
    }

    let _guard = state.write_lock.lock().await;
    db::mark_submitted(&state.writer, &task_id).await?;
    let updated = load_task(&state, &task_id).await?;
    Ok(Json(json!(updated.to_response())))
}

pub async fn approve_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_APPROVE_TASK).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;
    let poster_id = require_str_field(payload, "poster_id")?;
    if verified.agent_id != poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match poster_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Submitted {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot approve task in '{}' status, must be 'submitted'", task.status.as_str()),
        ));
    }
    if verified.agent_id != task.poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the poster can approve"));
    }

    let worker_id = task.worker_id.clone().ok_or_else(|| ServiceError::internal("submitted task has no worker"))?;
    let coordinator = EscrowCoordinator { central_bank: &state.central_bank, signer: &state.platform_signer };
    coordinator.release_escrow(&task.escrow_id, &worker_id).await?;

    let _guard = state.write_lock.lock().await;
    db::mark_approved(&state.writer, &task_id).await?;
    let updated = load_task(&state, &task_id).await?;
    Ok(Json(json!(updated.to_response())))
}

pub async fn dispute_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify_any(&req.token, &[ACTION_DISPUTE_TASK, ACTION_FILE_DISPUTE]).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;
    let poster_id = require_str_field(payload, "poster_id")?;
    if verified.agent_id != poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "signer does not match poster_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Submitted {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot dispute task in '{}' status, must be 'submitted'", task.status.as_str()),
        ));
    }
    if verified.agent_id != task.poster_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the poster can dispute"));
    }

    let reason = payload.get("reason").and_then(Value::as_str).unwrap_or("");
    if reason.is_empty() {
        return Err(ServiceError::new(ErrorCode::InvalidReason, "dispute reason must be a non-empty string"));
    }
    if reason.chars().count() > 10_000 {
        return Err(ServiceError::new(ErrorCode::InvalidReason, "dispute reason must not exceed 10,000 characters"));
    }

    let _guard = state.write_lock.lock().await;
    db::mark_disputed(&state.writer, &task_id, reason).await?;
    let updated = load_task(&state, &task_id).await?;
    Ok(Json(json!(updated.to_response())))
}

pub async fn record_ruling(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify_any(&req.token, &[ACTION_RECORD_RULING, ACTION_SUBMIT_RULING]).await?;
    let payload = &verified.payload;
    require_path_match(payload, "task_id", &task_id)?;

    let action = payload.get("action").and_then(Value::as_str).unwrap_or("");
    let ruling_id = if action == ACTION_RECORD_RULING {
        require_str_field(payload, "ruling_id")
            .ok()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::new(ErrorCode::InvalidPayload, "ruling_id must be a non-empty string"))?
    } else {
        match payload.get("ruling_id") {
            None => format!("rul-{}", uuid::Uuid::new_v4()),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(ServiceError::new(ErrorCode::InvalidPayload, "ruling_id must be a non-empty string")),
        }
    };

    let ruling_summary = require_str_field(payload, "ruling_summary")?;
    if ruling_summary.is_empty() {
        return Err(ServiceError::new(ErrorCode::InvalidPayload, "ruling_summary must be a non-empty string"));
    }
    let ruling_summary = ruling_summary.to_string();

    let worker_pct_raw = require_field(payload, "worker_pct")?.clone();

    if verified.agent_id != state.platform_agent_id {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the platform agent can record rulings"));
    }

    let task = load_task(&state, &task_id).await?;
    if task.status != TaskStatus::Disputed {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot record ruling for task in '{}' status, must be 'disputed'", task.status.as_str()),
        ));
    }

    let worker_pct = worker_pct_value(&worker_pct_raw)
        .ok_or_else(|| ServiceError::new(ErrorCode::InvalidWorkerPct, "worker_pct must be an integer between 0 and 100"))?;

    let worker_id = task.worker_id.clone().ok_or_else(|| ServiceError::internal("disputed task has no worker"))?;
    let coordinator = EscrowCoordinator { central_bank: &state.central_bank, signer: &state.platform_signer };
    if worker_pct == 0 {
        coordinator.release_escrow(&task.escrow_id, &task.poster_id).await?;
    } else if worker_pct == 100 {
        coordinator.release_escrow(&task.escrow_id, &worker_id).await?;
    } else {
        coordinator.split_escrow(&task.escrow_id, &worker_id, &task.poster_id, worker_pct).await?;
    }

    let _guard = state.write_lock.lock().await;
    db::mark_ruled(&state.writer, &task_id, &ruling_id, worker_pct, &ruling_summary).await?;
    let updated = load_task(&state, &task_id).await?;
    Ok(Json(json!(updated.to_response())))
}

pub async fn upload_asset(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let token = bearer::extract(&headers)?;
    let verified = state.identity.verify(&token, "upload_asset").await?;
    if let Some(payload_task_id) = verified.payload.get("task_id").and_then(Value::as_str) {
        if payload_task_id != task_id {
            return Err(ServiceError::new(ErrorCode::InvalidPayload, "task_id in payload does not match URL path"));
        }
    } else {
        return Err(ServiceError::new(ErrorCode::InvalidPayload, "missing required field: task_id"));
    }

    let task = load_task(&state, &task_id).await?;
    let task = deadlines::evaluate(&state, task).await?;
    if task.status != TaskStatus::Accepted {
        return Err(ServiceError::new(
            ErrorCode::InvalidStatus,
            format!("cannot upload an asset for task in '{}' status, must be 'accepted'", task.status.as_str()),
        ));
    }
    if Some(verified.agent_id.as_str()) != task.worker_id.as_deref() {
        return Err(ServiceError::new(ErrorCode::Forbidden, "only the assigned worker can upload deliverables"));
    }

    let mut filename = None;
    let mut content_type = None;
    let mut bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            content_type = field.content_type().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::new(ErrorCode::InvalidPayload, format!("failed to read file part: {e}")))?,
            );
            break;
        }
    }
    let bytes = bytes.ok_or_else(|| ServiceError::new(ErrorCode::NoFile, "no file part present in multipart body"))?;
    let filename = filename.unwrap_or_else(|| "upload".to_string());
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    if db::count_assets(&state.reader, &task_id).await? >= state.max_assets_per_task {
        return Err(ServiceError::new(
            ErrorCode::TooManyAssets,
            format!("task already has the maximum of {} assets", state.max_assets_per_task),
        ));
    }

    let asset_id = format!("asset-{}", uuid::Uuid::new_v4());
    let stored = asset_manager::store(&state.storage_root, &task_id, &asset_id, state.max_asset_size_bytes, &bytes)?;

    let asset = db::insert_asset(
        &state.writer,
        &asset_id,
        &task_id,
        &verified.agent_id,
        &filename,
        &content_type,
        stored.size_bytes,
        &stored.content_hash,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!(asset))))
}

pub async fn list_assets(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ServiceResult<Json<Value>> {
    load_task(&state, &task_id).await?;
    let assets = db::get_assets_for_task(&state.reader, &task_id).await?;
    Ok(Json(json!({"task_id": task_id, "assets": assets})))
}

pub async fn download_asset(
    State(state): State<AppState>,
    Path((task_id, asset_id)): Path<(String, String)>,
) -> ServiceResult<impl IntoResponse> {
    load_task(&state, &task_id).await?;
    let asset = db::get_asset(&state.reader, &task_id, &asset_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::AssetNotFound, "asset not found"))?;
    let bytes = asset_manager::read(&state.storage_root, &task_id, &asset_id)?;
    Ok(([(header::CONTENT_TYPE, asset.content_type)], bytes))
}

pub async fn health(State(state): State<AppState>) -> ServiceResult<Json<Value>> {
    let total_tasks = db::count_tasks(&state.reader).await?;
    let by_status = db::count_tasks_by_status(&state.reader).await?;
    let mut counts = serde_json::Map::new();
    for status in TaskStatus::ALL {
        counts.insert(status.as_str().to_string(), json!(0));
    }
    for (status, n) in by_status {
        counts.insert(status, json!(n));
    }
    Ok(Json(agent_economy_common::health::health_body(vec![
        ("total_tasks", json!(total_tasks)),
        ("tasks_by_status", Value::Object(counts)),
    ])))
}
