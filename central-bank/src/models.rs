use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub account_id: String,
    pub balance: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub tx_id: String,
    pub account_id: String,
    pub kind: String,
    pub amount: i64,
    pub balance_after: i64,
    pub reference: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum EscrowStatus {
    Locked,
    Released,
    Split,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Locked => "locked",
            EscrowStatus::Released => "released",
            EscrowStatus::Split => "split",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "released" => EscrowStatus::Released,
            "split" => EscrowStatus::Split,
            _ => EscrowStatus::Locked,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Escrow {
    pub escrow_id: String,
    pub payer_account_id: String,
    pub amount: i64,
    pub task_id: String,
    pub status: EscrowStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}
