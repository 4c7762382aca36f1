//! Lazy deadline evaluation, per spec section 4.3: deadlines are stored as
//! durations plus an anchor timestamp; the absolute deadline is recomputed on
//! every read, and a non-terminal task whose relevant deadline has passed is
//! transitioned inline, in the same call that read it, before the response is
//! built. Grounded in `DeadlineEvaluator`/`task_manager.py`'s per-status
//! deadline checks.

use crate::escrow_coordinator::EscrowCoordinator;
use crate::models::{Task, TaskStatus};
use crate::{db, state::AppState};
use agent_economy_common::error::ServiceResult;

pub fn compute_deadline(
    anchor: Option<chrono::DateTime<chrono::Utc>>,
    seconds: i64,
) -> Option<chrono::DateTime<chrono::Utc>> {
    anchor.map(|a| a + chrono::Duration::seconds(seconds))
}

/// Picks which anchor/duration pair governs a task's next transition,
/// per its current status. Terminal and unrecognized statuses have no
/// deadline to watch.
fn select_deadline(task: &Task) -> Option<chrono::DateTime<chrono::Utc>> {
    match task.status {
        TaskStatus::Open => compute_deadline(Some(task.created_at), task.bidding_deadline_seconds),
        TaskStatus::Accepted => compute_deadline(task.accepted_at, task.deadline_seconds),
        TaskStatus::Submitted => compute_deadline(task.submitted_at, task.review_deadline_seconds),
        _ => None,
    }
}

/// Evaluates and, if needed, applies the deadline side-effect for a single
/// task, returning the possibly-updated row. Terminal tasks pass through
/// unchanged - their transition timestamp is permanent once observed.
pub async fn evaluate(state: &AppState, task: Task) -> ServiceResult<Task> {
    if task.status.is_terminal() {
        return Ok(task);
    }

    let now = chrono::Utc::now();
    let deadline = select_deadline(&task);

    let Some(deadline) = deadline else {
        return Ok(task);
    };
    if now < deadline {
        return Ok(task);
    }

    let _guard = state.write_lock.lock().await;
    // Re-fetch: another request may have already applied this transition
    // while we were waiting for the lock.
    let current = db::get_task(&state.reader, &task.task_id)
        .await?
        .unwrap_or(task);
    if current.status.is_terminal() {
        return Ok(current);
    }

    let coordinator = EscrowCoordinator {
        central_bank: &state.central_bank,
        signer: &state.platform_signer,
    };

    match current.status {
        TaskStatus::Open => {
            coordinator.release_escrow(&current.escrow_id, &current.poster_id).await?;
            db::mark_expired(&state.writer, &current.task_id).await?;
        }
        TaskStatus::Accepted => {
            coordinator.release_escrow(&current.escrow_id, &current.poster_id).await?;
            db::mark_expired(&state.writer, &current.task_id).await?;
        }
        TaskStatus::Submitted => {
            let worker_id = current
                .worker_id
                .clone()
                .expect("a submitted task always has an assigned worker");
            coordinator.release_escrow(&current.escrow_id, &worker_id).await?;
            db::mark_approved(&state.writer, &current.task_id).await?;
        }
        _ => {}
    }

    db::get_task(&state.reader, &current.task_id)
        .await?
        .ok_or_else(|| agent_economy_common::error::ServiceError::internal("task vanished during deadline evaluation"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> chrono::DateTime<chrono::Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn open_task() -> Task {
        Task {
            task_id: "t-1".to_string(),
            poster_id: "a-poster".to_string(),
            title: "title".to_string(),
            spec: "spec".to_string(),
            reward: 100,
            bidding_deadline_seconds: 3_600,
            deadline_seconds: 7_200,
            review_deadline_seconds: 1_800,
            status: TaskStatus::Open,
            escrow_id: "esc-1".to_string(),
            bid_count: 0,
            worker_id: None,
            accepted_bid_id: None,
            created_at: anchor(),
            accepted_at: None,
            submitted_at: None,
            approved_at: None,
            cancelled_at: None,
            disputed_at: None,
            dispute_reason: None,
            ruling_id: None,
            ruled_at: None,
            worker_pct: None,
            ruling_summary: None,
            expired_at: None,
            escrow_pending: false,
        }
    }

    #[test]
    fn compute_deadline_adds_seconds_to_the_anchor() {
        let deadline = compute_deadline(Some(anchor()), 3_600).unwrap();
        assert_eq!(deadline, anchor() + chrono::Duration::seconds(3_600));
    }

    #[test]
    fn compute_deadline_is_none_without_an_anchor() {
        assert!(compute_deadline(None, 3_600).is_none());
    }

    #[test]
    fn compute_deadline_handles_a_zero_duration() {
        assert_eq!(compute_deadline(Some(anchor()), 0).unwrap(), anchor());
    }

    #[test]
    fn select_deadline_open_task_counts_from_creation() {
        let task = open_task();
        assert_eq!(select_deadline(&task), Some(task.created_at + chrono::Duration::seconds(task.bidding_deadline_seconds)));
    }

    #[test]
    fn select_deadline_accepted_task_counts_from_acceptance() {
        let mut task = open_task();
        task.status = TaskStatus::Accepted;
        task.accepted_at = Some(anchor());
        assert_eq!(select_deadline(&task), Some(anchor() + chrono::Duration::seconds(task.deadline_seconds)));
    }

    #[test]
    fn select_deadline_submitted_task_counts_from_submission() {
        let mut task = open_task();
        task.status = TaskStatus::Submitted;
        task.submitted_at = Some(anchor());
        assert_eq!(select_deadline(&task), Some(anchor() + chrono::Duration::seconds(task.review_deadline_seconds)));
    }

    #[test]
    fn select_deadline_missing_anchor_for_current_status_is_none() {
        let mut task = open_task();
        task.status = TaskStatus::Accepted;
        task.accepted_at = None;
        assert_eq!(select_deadline(&task), None);
    }

    #[test]
    fn select_deadline_terminal_statuses_have_no_deadline() {
        for status in [TaskStatus::Approved, TaskStatus::Cancelled, TaskStatus::Ruled, TaskStatus::Expired, TaskStatus::Disputed] {
            let mut task = open_task();
            task.status = status;
            assert_eq!(select_deadline(&task), None);
        }
    }
}
