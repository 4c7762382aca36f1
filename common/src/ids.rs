//! ID generators for the entity prefixes named throughout spec section 3.

use uuid::Uuid;

fn prefixed(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

pub fn new_agent_id() -> String {
    prefixed("a")
}

pub fn new_tx_id() -> String {
    prefixed("tx")
}

pub fn new_escrow_id() -> String {
    prefixed("esc")
}

pub fn new_task_id() -> String {
    prefixed("t")
}

pub fn new_bid_id() -> String {
    prefixed("bid")
}

pub fn new_asset_id() -> String {
    prefixed("asset")
}

pub fn new_dispute_id() -> String {
    prefixed("disp")
}

pub fn new_vote_id() -> String {
    prefixed("vote")
}

pub fn new_feedback_id() -> String {
    prefixed("fb")
}

/// Validates `t-<uuid4>`-shaped identifiers (create_task's `task_id` field,
/// per spec section 4.3).
pub fn looks_like_id(value: &str, prefix: &str) -> bool {
    match value.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('-')) {
        Some(uuid_part) => Uuid::parse_str(uuid_part).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_match_their_own_shape_check() {
        assert!(looks_like_id(&new_task_id(), "t"));
        assert!(looks_like_id(&new_agent_id(), "a"));
        assert!(!looks_like_id("t-not-a-uuid", "t"));
        assert!(!looks_like_id("bid-1234", "t"));
    }
}
