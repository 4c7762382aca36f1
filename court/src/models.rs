use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeStatus {
    RebuttalPending,
    Judging,
    Ruled,
}

impl DisputeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisputeStatus::RebuttalPending => "rebuttal_pending",
            DisputeStatus::Judging => "judging",
            DisputeStatus::Ruled => "ruled",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "judging" => DisputeStatus::Judging,
            "ruled" => DisputeStatus::Ruled,
            _ => DisputeStatus::RebuttalPending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispute {
    pub dispute_id: String,
    pub task_id: String,
    pub claimant_id: String,
    pub respondent_id: String,
    pub claim: String,
    pub rebuttal: Option<String>,
    pub status: DisputeStatus,
    pub escrow_id: String,
    pub rebuttal_deadline: DateTime<Utc>,
    pub worker_pct: Option<i64>,
    pub ruling_summary: Option<String>,
    pub filed_at: DateTime<Utc>,
    pub rebutted_at: Option<DateTime<Utc>>,
    pub ruled_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn to_response(&self, votes: Vec<VoteResponse>) -> DisputeResponse {
        DisputeResponse {
            dispute_id: self.dispute_id.clone(),
            task_id: self.task_id.clone(),
            claimant_id: self.claimant_id.clone(),
            respondent_id: self.respondent_id.clone(),
            claim: self.claim.clone(),
            rebuttal: self.rebuttal.clone(),
            status: self.status.as_str(),
            escrow_id: self.escrow_id.clone(),
            rebuttal_deadline: self.rebuttal_deadline,
            worker_pct: self.worker_pct,
            ruling_summary: self.ruling_summary.clone(),
            filed_at: self.filed_at,
            rebutted_at: self.rebutted_at,
            ruled_at: self.ruled_at,
            votes,
        }
    }

    pub fn to_summary(&self) -> DisputeSummary {
        DisputeSummary {
            dispute_id: self.dispute_id.clone(),
            task_id: self.task_id.clone(),
            claimant_id: self.claimant_id.clone(),
            respondent_id: self.respondent_id.clone(),
            status: self.status.as_str(),
            worker_pct: self.worker_pct,
            filed_at: self.filed_at,
            ruled_at: self.ruled_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vote {
    pub vote_id: String,
    pub dispute_id: String,
    pub judge_id: String,
    pub worker_pct: i64,
    pub reasoning: String,
    pub voted_at: DateTime<Utc>,
}

impl Vote {
    pub fn to_response(&self) -> VoteResponse {
        VoteResponse {
            vote_id: self.vote_id.clone(),
            judge_id: self.judge_id.clone(),
            worker_pct: self.worker_pct,
            reasoning: self.reasoning.clone(),
            voted_at: self.voted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteResponse {
    pub vote_id: String,
    pub judge_id: String,
    pub worker_pct: i64,
    pub reasoning: String,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisputeResponse {
    pub dispute_id: String,
    pub task_id: String,
    pub claimant_id: String,
    pub respondent_id: String,
    pub claim: String,
    pub rebuttal: Option<String>,
    pub status: &'static str,
    pub escrow_id: String,
    pub rebuttal_deadline: DateTime<Utc>,
    pub worker_pct: Option<i64>,
    pub ruling_summary: Option<String>,
    pub filed_at: DateTime<Utc>,
    pub rebutted_at: Option<DateTime<Utc>>,
    pub ruled_at: Option<DateTime<Utc>>,
    pub votes: Vec<VoteResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisputeSummary {
    pub dispute_id: String,
    pub task_id: String,
    pub claimant_id: String,
    pub respondent_id: String,
    pub status: &'static str,
    pub worker_pct: Option<i64>,
    pub filed_at: DateTime<Utc>,
    pub ruled_at: Option<DateTime<Utc>>,
}
