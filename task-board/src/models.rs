use crate::deadlines::compute_deadline;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Open,
    Accepted,
    Submitted,
    Approved,
    Cancelled,
    Disputed,
    Ruled,
    Expired,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Accepted => "accepted",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Approved => "approved",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Disputed => "disputed",
            TaskStatus::Ruled => "ruled",
            TaskStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "accepted" => TaskStatus::Accepted,
            "submitted" => TaskStatus::Submitted,
            "approved" => TaskStatus::Approved,
            "cancelled" => TaskStatus::Cancelled,
            "disputed" => TaskStatus::Disputed,
            "ruled" => TaskStatus::Ruled,
            "expired" => TaskStatus::Expired,
            _ => TaskStatus::Open,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Approved | TaskStatus::Cancelled | TaskStatus::Expired | TaskStatus::Ruled
        )
    }

    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Open,
        TaskStatus::Accepted,
        TaskStatus::Submitted,
        TaskStatus::Approved,
        TaskStatus::Cancelled,
        TaskStatus::Disputed,
        TaskStatus::Ruled,
        TaskStatus::Expired,
    ];
}

/// Mirrors `task_store.py`'s 26-column row shape; deadlines are stored as
/// durations plus an anchor timestamp and recomputed to absolute instants on
/// every read rather than persisted.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub poster_id: String,
    pub title: String,
    pub spec: String,
    pub reward: i64,
    pub bidding_deadline_seconds: i64,
    pub deadline_seconds: i64,
    pub review_deadline_seconds: i64,
    pub status: TaskStatus,
    pub escrow_id: String,
    pub bid_count: i64,
    pub worker_id: Option<String>,
    pub accepted_bid_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub accepted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub approved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cancelled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub disputed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub dispute_reason: Option<String>,
    pub ruling_id: Option<String>,
    pub ruled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub worker_pct: Option<i64>,
    pub ruling_summary: Option<String>,
    pub expired_at: Option<chrono::DateTime<chrono::Utc>>,
    pub escrow_pending: bool,
}

impl Task {
    pub fn to_response(&self) -> TaskResponse {
        TaskResponse {
            task_id: self.task_id.clone(),
            poster_id: self.poster_id.clone(),
            title: self.title.clone(),
            spec: self.spec.clone(),
            reward: self.reward,
            bidding_deadline_seconds: self.bidding_deadline_seconds,
            deadline_seconds: self.deadline_seconds,
            review_deadline_seconds: self.review_deadline_seconds,
            status: self.status.as_str(),
            escrow_id: self.escrow_id.clone(),
            bid_count: self.bid_count,
            worker_id: self.worker_id.clone(),
            accepted_bid_id: self.accepted_bid_id.clone(),
            created_at: self.created_at,
            accepted_at: self.accepted_at,
            submitted_at: self.submitted_at,
            approved_at: self.approved_at,
            cancelled_at: self.cancelled_at,
            disputed_at: self.disputed_at,
            dispute_reason: self.dispute_reason.clone(),
            ruling_id: self.ruling_id.clone(),
            ruled_at: self.ruled_at,
            worker_pct: self.worker_pct,
            ruling_summary: self.ruling_summary.clone(),
            expired_at: self.expired_at,
            escrow_pending: self.escrow_pending,
            bidding_deadline: compute_deadline(Some(self.created_at), self.bidding_deadline_seconds),
            execution_deadline: compute_deadline(self.accepted_at, self.deadline_seconds),
            review_deadline: compute_deadline(self.submitted_at, self.review_deadline_seconds),
        }
    }

    pub fn to_summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            poster_id: self.poster_id.clone(),
            title: self.title.clone(),
            reward: self.reward,
            status: self.status.as_str(),
            bid_count: self.bid_count,
            worker_id: self.worker_id.clone(),
            created_at: self.created_at,
            bidding_deadline: compute_deadline(Some(self.created_at), self.bidding_deadline_seconds),
            execution_deadline: compute_deadline(self.accepted_at, self.deadline_seconds),
            review_deadline: compute_deadline(self.submitted_at, self.review_deadline_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub poster_id: String,
    pub title: String,
    pub spec: String,
    pub reward: i64,
    pub bidding_deadline_seconds: i64,
    pub deadline_seconds: i64,
    pub review_deadline_seconds: i64,
    pub status: &'static str,
    pub escrow_id: String,
    pub bid_count: i64,
    pub worker_id: Option<String>,
    pub accepted_bid_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub accepted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub approved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cancelled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub disputed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub dispute_reason: Option<String>,
    pub ruling_id: Option<String>,
    pub ruled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub worker_pct: Option<i64>,
    pub ruling_summary: Option<String>,
    pub expired_at: Option<chrono::DateTime<chrono::Utc>>,
    pub escrow_pending: bool,
    pub bidding_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub execution_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub review_deadline: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub poster_id: String,
    pub title: String,
    pub reward: i64,
    pub status: &'static str,
    pub bid_count: i64,
    pub worker_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub bidding_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub execution_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub review_deadline: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bid {
    pub bid_id: String,
    pub task_id: String,
    pub bidder_id: String,
    pub amount: i64,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub asset_id: String,
    pub task_id: String,
    pub uploader_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}
