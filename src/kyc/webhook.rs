// Oracle callback payloads and signature verification

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::core::errors::{ServiceError, ServiceResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the raw body
pub const SIGNATURE_HEADER: &str = "X-SHA2-Signature";

pub const RESOURCE_CHECK: &str = "check";
pub const ACTION_CHECK_COMPLETED: &str = "check.completed";

#[derive(Debug, Clone, Deserialize)]
struct WebhookObject {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEvent {
    resource_type: String,
    action: String,
    #[serde(default)]
    object: Option<WebhookObject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { payload: RawEvent },
    Flat(RawEvent),
}

/// Callback event reduced to the fields the workflow reads
///
/// The check result itself is never taken from here; the check is re-read from the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub resource_type: String,
    pub action: String,
    pub object_id: Option<String>,
}

impl WebhookEvent {
    /// Accepts `{"payload": {...}}` as well as the bare event object
    pub fn parse(body: &[u8]) -> ServiceResult<Self> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid webhook payload: {}", e)))?;

        let raw = match envelope {
            Envelope::Wrapped { payload } => payload,
            Envelope::Flat(raw) => raw,
        };

        Ok(Self {
            resource_type: raw.resource_type,
            action: raw.action,
            object_id: raw.object.map(|o| o.id),
        })
    }

    /// Check id when this is a completed-check event
    pub fn completed_check_id(&self) -> Option<&str> {
        if self.resource_type == RESOURCE_CHECK && self.action == ACTION_CHECK_COMPLETED {
            self.object_id.as_deref()
        } else {
            None
        }
    }
}

/// Compare `provided` (hex) with HMAC-SHA256(`secret`, `body`) in constant time
pub fn verify_signature(secret: &[u8], body: &[u8], provided: Option<&str>) -> ServiceResult<()> {
    let provided = provided
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::AuthenticationError("Missing webhook signature".to_string()))?;

    let expected = sign(secret, body)?;
    let provided = provided.to_ascii_lowercase();

    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(ServiceError::AuthenticationError("Webhook signature mismatch".to_string()))
    }
}

/// Hex HMAC-SHA256 of `body`
pub fn sign(secret: &[u8], body: &[u8]) -> ServiceResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ServiceError::InternalError(format!("HMAC key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
