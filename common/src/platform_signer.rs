//! Holds the platform agent's private key so Task Board and Court can sign
//! their own outbound calls to Central Bank (`escrow_release`, `escrow_split`)
//! and to each other (`record_ruling`), the same way the original's
//! `DemoSigner`/`PlatformSigner` holds a key to act as the platform.
//!
//! The key is stored on disk as a base64-encoded 32-byte Ed25519 seed rather
//! than PEM, to avoid pulling in a PEM-parsing dependency the rest of the
//! stack doesn't otherwise need.

use crate::envelope;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde_json::Value;

pub struct PlatformSigner {
    pub agent_id: String,
    signing_key: SigningKey,
}

impl PlatformSigner {
    pub fn load(key_path: &str, agent_id: impl Into<String>) -> Result<Self, String> {
        let raw = std::fs::read_to_string(key_path)
            .map_err(|e| format!("failed to read platform signing key at {key_path}: {e}"))?;
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|e| format!("platform signing key is not valid base64: {e}"))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "platform signing key must be exactly 32 raw bytes".to_string())?;
        Ok(Self {
            agent_id: agent_id.into(),
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Signs `payload` (which must already carry an `"action"` field) as the
    /// platform agent.
    pub fn sign(&self, payload: &Value) -> String {
        envelope::encode(&self.agent_id, payload, &self.signing_key)
    }
}
