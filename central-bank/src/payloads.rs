//! Action payloads carried inside the signed envelope. Each mutating
//! endpoint expects `payload.action` to equal the constant below; mismatches
//! are rejected by `IdentityClient::verify` before a handler ever sees them.

use serde::Deserialize;

pub const ACTION_CREATE_ACCOUNT: &str = "create_account";
pub const ACTION_CREDIT: &str = "credit";
pub const ACTION_ESCROW_LOCK: &str = "escrow_lock";
pub const ACTION_ESCROW_RELEASE: &str = "escrow_release";
pub const ACTION_ESCROW_SPLIT: &str = "escrow_split";

#[derive(Debug, Deserialize)]
pub struct CreateAccountPayload {
    pub account_id: String,
    #[serde(default)]
    pub initial_balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreditPayload {
    pub account_id: String,
    pub amount: i64,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct EscrowLockPayload {
    pub payer_account_id: String,
    pub task_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct EscrowReleasePayload {
    pub escrow_id: String,
    pub recipient_account_id: String,
}

#[derive(Debug, Deserialize)]
pub struct EscrowSplitPayload {
    pub escrow_id: String,
    pub worker_pct: i64,
    pub worker_account_id: String,
    pub poster_account_id: String,
}
