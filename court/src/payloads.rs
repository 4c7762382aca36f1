//! Action-name constants for the envelopes Court verifies. As in
//! `task-board`, handlers index fields directly off the verified
//! `serde_json::Value` rather than decoding into per-action structs up
//! front.

pub const ACTION_FILE_DISPUTE: &str = "file_dispute";
pub const ACTION_SUBMIT_REBUTTAL: &str = "submit_rebuttal";
pub const ACTION_EXECUTE_RULING: &str = "execute_ruling";

/// Action name Task Board's own `record_ruling` handler accepts; Court is
/// the caller, not the verifier, of this one.
pub const ACTION_RECORD_RULING: &str = "record_ruling";

/// Action name the reputation service's `/feedback` handler verifies.
pub const ACTION_SUBMIT_FEEDBACK: &str = "submit_feedback";
