//! Shared infrastructure for the agent economy's four trust-plane services:
//! the signed-envelope codec, the categorical error taxonomy and its HTTP
//! mapping, YAML configuration loading, SQLite pool setup, ID generation,
//! the Identity HTTP client, a generic downstream-call helper, and tracing
//! initialization. Grounded in how `eltris-core` centralizes cross-service
//! concerns for the rest of the teacher workspace.

pub mod bearer;
pub mod central_bank_client;
pub mod config;
pub mod db;
pub mod downstream;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod health;
pub mod identity_client;
pub mod ids;
pub mod logging;
pub mod platform_signer;
pub mod reputation_client;
