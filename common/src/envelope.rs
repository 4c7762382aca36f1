//! The compact three-part signed envelope described in spec section 6.1:
//! `header.payload.signature`, each part base64url (no padding) encoded.
//!
//! `decode` only parses structure - it does not check the signature. Identity
//! is the sole verifier (it owns the agent/public-key registry); every other
//! service calls out to Identity's `/verify` endpoint instead of checking
//! Ed25519 signatures itself. The signing half (`encode`) is used by Identity
//! itself (for its own test fixtures) and by `agent-cli`, which holds agent
//! private keys on behalf of the demo population.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeDecodeError {
    #[error("envelope must have exactly three dot-separated parts")]
    MalformedStructure,
    #[error("envelope segment is not valid base64url")]
    BadBase64,
    #[error("envelope header is not valid JSON")]
    BadHeaderJson,
    #[error("envelope payload is not valid JSON")]
    BadPayloadJson,
    #[error("envelope signature is not valid")]
    BadSignature,
    #[error("payload is missing required string field `action`")]
    MissingAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

/// A structurally-valid, not-yet-cryptographically-verified envelope.
#[derive(Debug, Clone)]
pub struct DecodedEnvelope {
    pub header: EnvelopeHeader,
    pub payload: Value,
    pub action: String,
    /// `header_b64.payload_b64`, the exact bytes the signature covers.
    pub signing_input: String,
    pub signature: Signature,
}

pub fn decode(token: &str) -> Result<DecodedEnvelope, EnvelopeDecodeError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(EnvelopeDecodeError::MalformedStructure);
    }
    let [header_b64, payload_b64, sig_b64] = [parts[0], parts[1], parts[2]];

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| EnvelopeDecodeError::BadBase64)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| EnvelopeDecodeError::BadBase64)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| EnvelopeDecodeError::BadBase64)?;

    let header: EnvelopeHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| EnvelopeDecodeError::BadHeaderJson)?;
    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| EnvelopeDecodeError::BadPayloadJson)?;

    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .ok_or(EnvelopeDecodeError::MissingAction)?
        .to_string();

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| EnvelopeDecodeError::BadSignature)?;
    let signature = Signature::from_bytes(&sig_array);

    Ok(DecodedEnvelope {
        header,
        payload,
        action,
        signing_input: format!("{header_b64}.{payload_b64}"),
        signature,
    })
}

/// Verifies `envelope`'s signature was produced by `verifying_key`. Pure
/// cryptographic check - Identity is the only caller with a key registry to
/// look `kid` up against.
pub fn verify_signature(envelope: &DecodedEnvelope, verifying_key: &VerifyingKey) -> bool {
    verifying_key
        .verify(envelope.signing_input.as_bytes(), &envelope.signature)
        .is_ok()
}

/// Encodes and signs a payload as a compact envelope. `kid` is the signer's
/// `agent_id`; the payload must itself carry a matching `"action"` field.
pub fn encode(kid: &str, payload: &Value, signing_key: &SigningKey) -> String {
    let header = EnvelopeHeader {
        alg: "EdDSA".to_string(),
        typ: "JWT".to_string(),
        kid: kid.to_string(),
    };
    let header_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header always serializes"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).expect("payload always serializes"));
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = signing_key.sign(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    format!("{signing_input}.{sig_b64}")
}

/// Parses the `ed25519:<base64-raw-32-bytes>` public key form used
/// throughout the registry and wire formats.
pub fn parse_public_key(encoded: &str) -> Result<VerifyingKey, String> {
    let raw = encoded
        .strip_prefix("ed25519:")
        .ok_or_else(|| "public key must start with 'ed25519:'".to_string())?;
    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(raw))
        .map_err(|_| "public key is not valid base64".to_string())?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "public key must be exactly 32 raw bytes".to_string())?;
    VerifyingKey::from_bytes(&array).map_err(|e| e.to_string())
}

pub fn format_public_key(key: &VerifyingKey) -> String {
    format!(
        "ed25519:{}",
        base64::engine::general_purpose::STANDARD.encode(key.to_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use serde_json::json;

    #[test]
    fn round_trips_a_signed_payload() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let payload = json!({"action": "create_task", "task_id": "t-1"});

        let token = encode("a-1234", &payload, &signing_key);
        let decoded = decode(&token).expect("structurally valid");

        assert_eq!(decoded.header.kid, "a-1234");
        assert_eq!(decoded.action, "create_task");
        assert!(verify_signature(&decoded, &verifying_key));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let token = encode("a-1", &json!({"action": "x"}), &signing_key);

        let mut parts: Vec<&str> = token.split('.').collect();
        let tampered_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"action": "y"})).unwrap());
        parts[1] = &tampered_payload;
        let tampered = parts.join(".");

        let decoded = decode(&tampered).expect("still structurally valid");
        assert!(!verify_signature(&decoded, &verifying_key));
    }

    #[test]
    fn rejects_malformed_structure() {
        assert_eq!(
            decode("not-an-envelope").unwrap_err(),
            EnvelopeDecodeError::MalformedStructure
        );
    }

    #[test]
    fn public_key_round_trips() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let encoded = format_public_key(&verifying_key);
        assert!(encoded.starts_with("ed25519:"));
        let parsed = parse_public_key(&encoded).unwrap();
        assert_eq!(parsed, verifying_key);
    }
}
