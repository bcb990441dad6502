//! Push-notification decoding
//!
//! Converts an opaque platform push payload into a structured incoming-call
//! descriptor. The platform-specific envelope (APNs, FCM, ...) is stripped by
//! the host; this module only understands the calling payload itself.

use serde::{Deserialize, Serialize};

use crate::call::CallId;
use crate::error::{ClientError, ClientResult};

/// Structured incoming-call descriptor carried by a push notification
///
/// # Examples
///
/// ```rust
/// use clearcall_core::push::PushCallDescriptor;
///
/// let payload = serde_json::json!({
///     "callId": "7f1de124-6d6b-4b1e-8a52-05f0f4f0a001",
///     "callerId": "8:user:alice",
///     "displayName": "Alice",
///     "videoCall": true,
/// });
///
/// let descriptor = PushCallDescriptor::decode(&payload).unwrap();
/// assert_eq!(descriptor.caller_identity, "8:user:alice");
/// assert!(descriptor.video_enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCallDescriptor {
    /// Id of the ringing call
    #[serde(rename = "callId")]
    pub call_id: CallId,
    /// Opaque identity of the caller
    #[serde(rename = "callerId")]
    pub caller_identity: String,
    /// Display name of the caller, if carried by the payload
    #[serde(rename = "displayName", default)]
    pub caller_display_name: Option<String>,
    /// Whether the caller started with video
    #[serde(rename = "videoCall", default)]
    pub video_enabled: bool,
}

impl PushCallDescriptor {
    /// Decode a push payload into a descriptor.
    ///
    /// Fails with [`ClientError::InvalidPushPayload`] when required fields
    /// are missing or malformed.
    pub fn decode(payload: &serde_json::Value) -> ClientResult<Self> {
        serde_json::from_value(payload.clone()).map_err(|e| ClientError::InvalidPushPayload {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_payload() {
        let payload = serde_json::json!({
            "callId": "7f1de124-6d6b-4b1e-8a52-05f0f4f0a001",
            "callerId": "8:user:bob",
        });
        let descriptor = PushCallDescriptor::decode(&payload).unwrap();
        assert_eq!(descriptor.caller_identity, "8:user:bob");
        assert_eq!(descriptor.caller_display_name, None);
        assert!(!descriptor.video_enabled);
    }

    #[test]
    fn rejects_malformed_payload() {
        let payload = serde_json::json!({ "callerId": "8:user:bob" });
        assert!(matches!(
            PushCallDescriptor::decode(&payload),
            Err(ClientError::InvalidPushPayload { .. })
        ));

        let payload = serde_json::json!({
            "callId": "not-a-uuid",
            "callerId": "8:user:bob",
        });
        assert!(matches!(
            PushCallDescriptor::decode(&payload),
            Err(ClientError::InvalidPushPayload { .. })
        ));
    }
}
