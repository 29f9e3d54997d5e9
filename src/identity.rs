//! Per-request identifiers for a response and its single output message.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::AdapterError;

const RESPONSE_ID_PREFIX: &str = "resp_";
const MESSAGE_ID_PREFIX: &str = "msg_";
const RESPONSE_ID_TAG: &str = "adapter";

/// Identifiers shared by every event of one response. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseIdentity {
    pub response_id: String,
    pub message_id: String,
    pub created_at: u64,
}

impl ResponseIdentity {
    /// Generate fresh identifiers from the operating system RNG.
    ///
    /// Fails instead of falling back to a weaker source when the RNG is unavailable.
    pub fn generate() -> Result<Self, AdapterError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AdapterError::Identity(e.to_string()))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AdapterError::Identity(e.to_string()))?;
        Ok(Self::from_parts(bytes, now.as_millis()))
    }

    /// Deterministic construction from random bytes and a unix timestamp in milliseconds.
    pub fn from_parts(random: [u8; 16], unix_millis: u128) -> Self {
        let token = uuid::Builder::from_random_bytes(random).into_uuid();
        let message_id = format!("{MESSAGE_ID_PREFIX}{}", token.simple());
        let plain = format!("{RESPONSE_ID_TAG}:{unix_millis}:{message_id}");
        let response_id = format!("{RESPONSE_ID_PREFIX}{}", URL_SAFE_NO_PAD.encode(plain));
        Self {
            response_id,
            message_id,
            created_at: (unix_millis / 1000) as u64,
        }
    }

    /// Recover the readable `adapter:<millis>:<message id>` form of a response id.
    /// Debugging aid only; clients treat ids as opaque.
    pub fn decode_response_id(response_id: &str) -> Option<String> {
        let encoded = response_id.strip_prefix(RESPONSE_ID_PREFIX)?;
        let raw = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(raw).ok()
    }
}
