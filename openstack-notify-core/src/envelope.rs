//! Two-layer oslo.messaging envelope unwrapping.
//!
//! oslo.messaging notifications arrive in one of two shapes:
//!
//! - **v1 / direct**: the raw bytes decode straight to the notification object.
//! - **v2 / wrapped**: the raw bytes decode to an envelope object carrying
//!   `oslo.version` and `oslo.message`, the latter a JSON-encoded string holding
//!   the actual notification.
//!
//! [`unwrap`] is stateless and safe to call concurrently from any number of
//! transport callback threads.

use serde_json::Value;

use crate::error::{EnvelopeError, EnvelopeResult};

const OSLO_VERSION_KEY: &str = "oslo.version";
const OSLO_MESSAGE_KEY: &str = "oslo.message";
const SUPPORTED_OSLO_VERSION: &str = "2.0";

/// Unwrap raw message bytes into the inner notification JSON value.
///
/// Tolerates both the v1 (direct) and v2 (wrapped) oslo.messaging formats. A
/// non-`"2.0"` `oslo.version` is logged at `warn` but does not fail the unwrap —
/// this tolerance is intentional (see design notes) and must not be tightened
/// into a hard failure.
pub fn unwrap(bytes: &[u8]) -> EnvelopeResult<Value> {
    let root: Value = serde_json::from_slice(bytes).map_err(EnvelopeError::MalformedOuter)?;

    let Value::Object(ref map) = root else {
        return Ok(root);
    };

    let (Some(version), Some(message)) = (map.get(OSLO_VERSION_KEY), map.get(OSLO_MESSAGE_KEY))
    else {
        return Ok(root);
    };

    if version.as_str() != Some(SUPPORTED_OSLO_VERSION) {
        tracing::warn!(
            oslo_version = ?version,
            "oslo.messaging envelope version is not {SUPPORTED_OSLO_VERSION}; continuing anyway"
        );
    }

    let message = message.as_str().ok_or(EnvelopeError::InnerNotString)?;
    serde_json::from_str(message).map_err(EnvelopeError::MalformedInner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn malformed_bytes_fail_with_envelope_error() {
        let err = unwrap(b"{{").unwrap_err();
        assert!(matches!(err, EnvelopeError::MalformedOuter(_)));
    }

    #[test]
    fn v1_direct_notification_passes_through_unchanged() {
        let body = json!({"event_type": "volume.delete.start", "payload": {"volume_id": "v-1"}});
        let bytes = serde_json::to_vec(&body).unwrap();
        assert_eq!(unwrap(&bytes).unwrap(), body);
    }

    #[test]
    fn v2_wrapped_notification_unwraps_inner_message() {
        let inner = json!({"event_type": "compute.instance.create.end"});
        let envelope = json!({
            "oslo.version": "2.0",
            "oslo.message": inner.to_string(),
        });
        let bytes = serde_json::to_vec(&envelope).unwrap();
        assert_eq!(unwrap(&bytes).unwrap(), inner);
    }

    #[test]
    fn non_2_0_oslo_version_still_unwraps() {
        let inner = json!({"event_type": "image.update"});
        let envelope = json!({
            "oslo.version": "1.0",
            "oslo.message": inner.to_string(),
        });
        let bytes = serde_json::to_vec(&envelope).unwrap();
        assert_eq!(unwrap(&bytes).unwrap(), inner);
    }

    #[test]
    fn malformed_inner_message_fails_with_envelope_error() {
        let envelope = json!({
            "oslo.version": "2.0",
            "oslo.message": "not json{{",
        });
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let err = unwrap(&bytes).unwrap_err();
        assert!(matches!(err, EnvelopeError::MalformedInner(_)));
    }

    // Arbitrary direct-form notifications, for the envelope idempotence law:
    // unwrap(direct_bytes) == direct_body, and wrap(unwrap(n)) round-trips.
    fn arb_notification() -> impl Strategy<Value = Value> {
        ("[a-z]{3,10}\\.[a-z]{3,10}", "[a-z0-9-]{1,12}").prop_map(|(event_type, resource_id)| {
            json!({
                "event_type": event_type,
                "payload": { "id": resource_id },
            })
        })
    }

    proptest! {
        #[test]
        fn direct_form_unwraps_to_itself(n in arb_notification()) {
            let bytes = serde_json::to_vec(&n).unwrap();
            prop_assert_eq!(unwrap(&bytes).unwrap(), n);
        }

        #[test]
        fn wrapping_then_unwrapping_round_trips(n in arb_notification()) {
            let envelope = json!({
                "oslo.version": "2.0",
                "oslo.message": n.to_string(),
            });
            let bytes = serde_json::to_vec(&envelope).unwrap();
            prop_assert_eq!(unwrap(&bytes).unwrap(), n);
        }
    }
}
