//! The six Court endpoints. `file_dispute`, `submit_rebuttal`, and
//! `execute_ruling` are platform-signed only (`dispute_service.py` never
//! lets a claimant or respondent call these directly - the platform agent
//! mediates on their behalf); `get_dispute`, `list_disputes`, and `health`
//! are public reads.

use crate::db::{self, ListFilter};
use crate::judges::DisputeContext;
use crate::models::{Dispute, DisputeStatus, VoteResponse};
use crate::payloads::{ACTION_EXECUTE_RULING, ACTION_FILE_DISPUTE, ACTION_RECORD_RULING, ACTION_SUBMIT_FEEDBACK, ACTION_SUBMIT_REBUTTAL};
use crate::state::AppState;
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use agent_economy_common::extract::Json as ReqJson;
use agent_economy_common::ids::new_dispute_id;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

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

fn require_platform_signer(state: &AppState, signer_id: &str, action: &str) -> ServiceResult<()> {
    if signer_id != state.platform_agent_id {
        return Err(ServiceError::new(
            ErrorCode::Forbidden,
            format!("only the platform agent can {action}"),
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

async fn build_response(pool: &sqlx::SqlitePool, dispute: &Dispute) -> ServiceResult<Value> {
    let votes = db::get_votes(pool, &dispute.dispute_id).await?;
    let votes: Vec<VoteResponse> = votes.iter().map(|v| v.to_response()).collect();
    Ok(json!(dispute.to_response(votes)))
}

pub async fn file_dispute(
    State(state): State<AppState>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let verified = state.identity.verify(&req.token, ACTION_FILE_DISPUTE).await?;
    let payload = &verified.payload;

    for field in ["task_id", "claimant_id", "respondent_id", "claim", "escrow_id"] {
        require_field(payload, field)?;
    }
    require_platform_signer(&state, &verified.agent_id, "file disputes")?;

    let task_id = require_str_field(payload, "task_id")?.to_string();
    let claimant_id = require_str_field(payload, "claimant_id")?.to_string();
    let respondent_id = require_str_field(payload, "respondent_id")?.to_string();
    let escrow_id = require_str_field(payload, "escrow_id")?.to_string();
    let claim = require_str_field(payload, "claim")?;
    if claim.is_empty() || claim.chars().count() > 10_000 {
        return Err(ServiceError::new(
            ErrorCode::InvalidPayload,
            "claim must be between 1 and 10,000 characters",
        ));
    }
    let claim = claim.to_string();

    if state.task_board.get_task(&task_id).await?.is_none() {
        return Err(ServiceError::new(ErrorCode::TaskNotFound, "task not found"));
    }

    let now = chrono::Utc::now();
    let dispute = Dispute {
        dispute_id: new_dispute_id(),
        task_id,
        claimant_id,
        respondent_id,
        claim,
        rebuttal: None,
        status: DisputeStatus::RebuttalPending,
        escrow_id,
        rebuttal_deadline: now + chrono::Duration::seconds(state.rebuttal_deadline_seconds),
        worker_pct: None,
        ruling_summary: None,
        filed_at: now,
        rebutted_at: None,
        ruled_at: None,
    };

    let _guard = state.write_lock.lock().await;
    let dispute = db::insert_dispute(&state.writer, dispute).await?;
    let body = build_response(&state.reader, &dispute).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn load_dispute(state: &AppState, dispute_id: &str) -> ServiceResult<Dispute> {
    db::get_dispute(&state.reader, dispute_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::DisputeNotFound, "dispute not found"))
}

pub async fn submit_rebuttal(
    State(state): State<AppState>,
    Path(dispute_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_SUBMIT_REBUTTAL).await?;
    let payload = &verified.payload;
    require_path_match(payload, "dispute_id", &dispute_id)?;
    let rebuttal = require_str_field(payload, "rebuttal")?;
    if rebuttal.is_empty() || rebuttal.chars().count() > 10_000 {
        return Err(ServiceError::new(
            ErrorCode::InvalidPayload,
            "rebuttal must be between 1 and 10,000 characters",
        ));
    }
    let rebuttal = rebuttal.to_string();
    require_platform_signer(&state, &verified.agent_id, "submit rebuttals")?;

    let dispute = load_dispute(&state, &dispute_id).await?;
    match dispute.status {
        DisputeStatus::Judging | DisputeStatus::Ruled => {
            return Err(ServiceError::new(
                ErrorCode::InvalidDisputeStatus,
                "dispute is not in rebuttal_pending status",
            ));
        }
        DisputeStatus::RebuttalPending if dispute.rebuttal.is_some() => {
            return Err(ServiceError::new(
                ErrorCode::RebuttalAlreadySubmitted,
                "a rebuttal has already been recorded for this dispute",
            ));
        }
        DisputeStatus::RebuttalPending => {}
    }

    let rebutted_at = chrono::Utc::now();
    let _guard = state.write_lock.lock().await;
    db::update_rebuttal(&state.writer, &dispute_id, &rebuttal, rebutted_at).await?;
    let updated = load_dispute(&state, &dispute_id).await?;
    let body = build_response(&state.reader, &updated).await?;
    Ok(Json(body))
}

fn delivery_rating(worker_pct: i64) -> &'static str {
    if worker_pct >= 80 {
        "extremely_satisfied"
    } else if worker_pct >= 40 {
        "satisfied"
    } else {
        "dissatisfied"
    }
}

fn spec_rating(worker_pct: i64) -> &'static str {
    if worker_pct >= 80 {
        "dissatisfied"
    } else if worker_pct >= 40 {
        "satisfied"
    } else {
        "extremely_satisfied"
    }
}

/// The ruling `worker_pct` is the median of every judge's vote - for an even
/// panel size this picks the upper of the two middle values.
fn median_worker_pct(worker_pcts: &[i64]) -> i64 {
    let mut sorted = worker_pcts.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

pub async fn execute_ruling(
    State(state): State<AppState>,
    Path(dispute_id): Path<String>,
    ReqJson(req): ReqJson<TokenRequest>,
) -> ServiceResult<Json<Value>> {
    let verified = state.identity.verify(&req.token, ACTION_EXECUTE_RULING).await?;
    let payload = &verified.payload;
    require_path_match(payload, "dispute_id", &dispute_id)?;
    require_platform_signer(&state, &verified.agent_id, "trigger rulings")?;

    let dispute = load_dispute(&state, &dispute_id).await?;
    if dispute.status == DisputeStatus::Ruled {
        return Err(ServiceError::new(ErrorCode::DisputeAlreadyRuled, "dispute has already been ruled"));
    }
    if dispute.status != DisputeStatus::RebuttalPending {
        return Err(ServiceError::new(
            ErrorCode::InvalidDisputeStatus,
            "dispute is not in rebuttal_pending status",
        ));
    }

    {
        let _guard = state.write_lock.lock().await;
        db::set_status(&state.writer, &dispute_id, DisputeStatus::Judging).await?;
    }

    if let Err(e) = run_ruling(&state, &dispute).await {
        let _guard = state.write_lock.lock().await;
        if let Err(revert_err) = db::revert_to_rebuttal_pending(&state.writer, &dispute_id).await {
            tracing::error!(dispute_id, error = %revert_err, "failed to revert dispute to rebuttal_pending");
        }
        return Err(e);
    }

    let ruled = load_dispute(&state, &dispute_id).await?;
    let body = build_response(&state.reader, &ruled).await?;
    Ok(Json(body))
}

/// The orchestration run while the dispute sits in `judging`: evaluate
/// judges, record feedback for both parties, then hand the verdict to Task
/// Board's `record_ruling`, which is the sole caller of Central Bank's
/// escrow endpoints for a disputed task (it already owns the escrow_id and
/// enforces the `disputed` precondition, so Court never calls
/// `escrow_split`/`escrow_release` itself - a second resolution attempt
/// would just bounce off Central Bank's single-resolution guard). Any
/// failure here is caught by the caller, which reverts the dispute back to
/// `rebuttal_pending`.
async fn run_ruling(state: &AppState, dispute: &Dispute) -> ServiceResult<()> {
    let task = state
        .task_board
        .get_task(&dispute.task_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::TaskBoardUnavailable, "task record is missing"))?;

    let task_title = task.get("title").and_then(Value::as_str).unwrap_or("");
    let task_spec = task.get("spec").and_then(Value::as_str).unwrap_or("");
    let reward = task.get("reward").and_then(Value::as_i64).unwrap_or(0);

    let context = DisputeContext {
        dispute_id: &dispute.dispute_id,
        task_id: &dispute.task_id,
        task_title,
        task_spec,
        reward,
        claim: &dispute.claim,
        rebuttal: dispute.rebuttal.as_deref(),
    };

    if state.judges.is_empty() {
        return Err(ServiceError::new(ErrorCode::JudgeUnavailable, "no judges configured"));
    }

    let now = chrono::Utc::now();
    let mut votes = Vec::with_capacity(state.judges.len());
    for (index, judge) in state.judges.iter().enumerate() {
        let vote = judge.evaluate(index, &context, &state.judge_http, now).await?;
        votes.push(db::new_vote(
            &dispute.dispute_id,
            vote.judge_id.unwrap_or_else(|| format!("judge-{index}")),
            vote.worker_pct,
            vote.reasoning,
            vote.voted_at.unwrap_or(now),
        ));
    }

    let worker_pcts: Vec<i64> = votes.iter().map(|v| v.worker_pct).collect();
    let worker_pct = median_worker_pct(&worker_pcts);
    let ruling_summary = votes
        .iter()
        .map(|v| v.reasoning.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let spec_token = state.platform_signer.sign(&json!({
        "action": ACTION_SUBMIT_FEEDBACK,
        "task_id": dispute.task_id,
        "from_agent_id": state.platform_agent_id,
        "to_agent_id": dispute.claimant_id,
        "category": "spec_quality",
        "rating": spec_rating(worker_pct),
        "comment": ruling_summary,
    }));
    state.reputation.record_feedback(&spec_token).await?;

    let delivery_token = state.platform_signer.sign(&json!({
        "action": ACTION_SUBMIT_FEEDBACK,
        "task_id": dispute.task_id,
        "from_agent_id": state.platform_agent_id,
        "to_agent_id": dispute.respondent_id,
        "category": "delivery_quality",
        "rating": delivery_rating(worker_pct),
        "comment": ruling_summary,
    }));
    state.reputation.record_feedback(&delivery_token).await?;

    let record_token = state.platform_signer.sign(&json!({
        "action": ACTION_RECORD_RULING,
        "task_id": dispute.task_id,
        "ruling_id": dispute.dispute_id,
        "worker_pct": worker_pct,
        "ruling_summary": ruling_summary,
    }));
    state.task_board.record_ruling(&dispute.task_id, &record_token).await?;

    let ruled_at = chrono::Utc::now();
    let _guard = state.write_lock.lock().await;
    db::persist_ruling(&state.writer, &dispute.dispute_id, worker_pct, &ruling_summary, ruled_at, &votes).await
}

pub async fn get_dispute(
    State(state): State<AppState>,
    Path(dispute_id): Path<String>,
) -> ServiceResult<Json<Value>> {
    let dispute = load_dispute(&state, &dispute_id).await?;
    let body = build_response(&state.reader, &dispute).await?;
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct ListDisputesQuery {
    pub task_id: Option<String>,
    pub status: Option<String>,
}

pub async fn list_disputes(
    State(state): State<AppState>,
    Query(q): Query<ListDisputesQuery>,
) -> ServiceResult<Json<Value>> {
    let disputes = db::list_disputes(
        &state.reader,
        ListFilter {
            task_id: q.task_id.as_deref(),
            status: q.status.as_deref(),
        },
    )
    .await?;
    let summaries: Vec<_> = disputes.iter().map(Dispute::to_summary).collect();
    Ok(Json(json!({"disputes": summaries})))
}

pub async fn health(State(state): State<AppState>) -> ServiceResult<Json<Value>> {
    let total_disputes = db::count_disputes(&state.reader).await?;
    let active_disputes = db::count_active(&state.reader).await?;
    Ok(Json(agent_economy_common::health::health_body(vec![
        ("total_disputes", json!(total_disputes)),
        ("active_disputes", json!(active_disputes)),
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_panel_is_the_middle_vote() {
        assert_eq!(median_worker_pct(&[20, 80, 50]), 50);
        assert_eq!(median_worker_pct(&[90, 10, 50, 10, 90]), 50);
    }

    #[test]
    fn median_of_even_panel_takes_the_upper_middle() {
        assert_eq!(median_worker_pct(&[0, 100]), 100);
        assert_eq!(median_worker_pct(&[20, 40, 60, 80]), 60);
    }

    #[test]
    fn median_of_single_vote_is_that_vote() {
        assert_eq!(median_worker_pct(&[37]), 37);
    }

    #[test]
    fn delivery_and_spec_ratings_are_inverse_of_each_other() {
        assert_eq!(delivery_rating(90), "extremely_satisfied");
        assert_eq!(spec_rating(90), "dissatisfied");
        assert_eq!(delivery_rating(10), "dissatisfied");
        assert_eq!(spec_rating(10), "extremely_satisfied");
    }
}
