//! Action-name constants for the envelopes Task Board verifies. Field
//! extraction happens directly off the verified `serde_json::Value` in
//! `handlers.rs` (mirroring `task_manager.py`'s own dict-indexing rather than
//! building a struct per action up front), since several actions validate
//! fields in an order that doesn't match a straightforward struct decode
//! (e.g. `create_task`'s dual `deadline_seconds`/`execution_deadline_seconds`
//! acceptance, or `record_ruling`'s two divergent `ruling_id` derivations).

pub const ACTION_CREATE_TASK: &str = "create_task";
pub const ACTION_CANCEL_TASK: &str = "cancel_task";
pub const ACTION_SUBMIT_BID: &str = "submit_bid";
pub const ACTION_LIST_BIDS: &str = "list_bids";
pub const ACTION_ACCEPT_BID: &str = "accept_bid";
pub const ACTION_SUBMIT_DELIVERABLE: &str = "submit_deliverable";
pub const ACTION_APPROVE_TASK: &str = "approve_task";
pub const ACTION_DISPUTE_TASK: &str = "dispute_task";
pub const ACTION_FILE_DISPUTE: &str = "file_dispute";
pub const ACTION_RECORD_RULING: &str = "record_ruling";
pub const ACTION_SUBMIT_RULING: &str = "submit_ruling";
