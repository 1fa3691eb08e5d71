//! Schema-tolerant notification parsing.
//!
//! Extracts a canonical [`OpenStackEvent`] from the heterogeneous per-service
//! payload shapes oslo.messaging notifications actually carry. The field lists
//! below are declared as data, not control flow, so that adding support for a
//! new resource type is a data addition rather than a new code path.

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::event::{OpenStackEvent, OpenStackEventBuilder};
use crate::resource::ResourceType;

const OSLO_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const NOVA_OBJECT_DATA_KEY: &str = "nova_object.data";

/// Parse a single oslo.messaging notification into a canonical event.
///
/// Returns `None` when the notification cannot be parsed at all (missing
/// `event_type`, or any unexpected shape encountered along the way) — the
/// caller is expected to log this as a skip and move on, never propagate a
/// panic out of the pipeline.
pub fn parse(cluster_id: &str, service: &str, notification: &Value) -> Option<OpenStackEvent> {
    let event_type = notification.get("event_type")?.as_str()?.to_string();
    let resource_type = ResourceType::from_event_type(&event_type);
    let payload = notification.get("payload").cloned();

    let mut builder = OpenStackEventBuilder::new(cluster_id, service, event_type.clone())
        .resource_type(resource_type);

    if let Some(priority) = str_field(notification, "priority") {
        builder = builder.priority(priority);
    }
    if let Some(publisher_id) = str_field(notification, "publisher_id") {
        builder = builder.publisher_id(publisher_id);
    }
    if let Some(message_id) = str_field(notification, "message_id") {
        builder = builder.message_id(message_id);
    }

    builder = builder.timestamp(parse_timestamp(notification.get("timestamp")));

    if let Some(payload) = &payload {
        if let Some(resource_id) = extract_resource_id(resource_type, payload) {
            builder = builder.resource_id(resource_id);
        }
        if let Some(status) = extract_status(resource_type, payload) {
            builder = builder.status(status);
        }
        if let Some(old_status) = extract_old_status(payload) {
            builder = builder.old_status(old_status);
        }
        builder = builder.payload(payload.clone());
    }

    let (action, phase) = decompose_event_type(&event_type, resource_type);
    if let Some(action) = action {
        builder = builder.action(action);
    }
    if let Some(phase) = phase {
        builder = builder.phase(phase);
    }

    Some(builder.build())
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Parse the oslo timestamp format `YYYY-MM-DD HH:MM:SS.ffffff` (UTC, no zone).
///
/// Falls back to the current time when absent or unparseable, per the data
/// model's "timestamp defaults to time of construction" rule.
fn parse_timestamp(raw: Option<&Value>) -> chrono::DateTime<Utc> {
    let Some(s) = raw.and_then(Value::as_str) else {
        return Utc::now();
    };

    match NaiveDateTime::parse_from_str(s, OSLO_TIMESTAMP_FORMAT) {
        Ok(naive) => Utc.from_utc_datetime(&naive),
        Err(e) => {
            tracing::debug!(raw = s, error = %e, "failed to parse oslo timestamp, using current time");
            Utc::now()
        }
    }
}

/// Resource-id field names tried, in order, within `payload` for each resource
/// type. The Nova versioned-notification shape and the `resource_info.id`
/// last resort are handled outside this table (see [`extract_resource_id`]).
fn resource_id_fields(rt: ResourceType) -> &'static [&'static str] {
    match rt {
        ResourceType::Server => &["instance_id", "uuid", "id"],
        ResourceType::Volume => &["volume_id", "id"],
        ResourceType::Snapshot => &["snapshot_id", "id"],
        ResourceType::Backup => &["backup_id", "id"],
        ResourceType::Image => &["id", "image_id"],
        ResourceType::Network => &["network_id", "id"],
        ResourceType::Subnet => &["subnet_id", "id"],
        ResourceType::Port => &["port_id", "id"],
        ResourceType::Router => &["router_id", "id"],
        ResourceType::FloatingIp => &["floatingip_id", "id"],
        ResourceType::LoadBalancer => &["loadbalancer_id", "id"],
        ResourceType::Stack => &["stack_identity", "id"],
        _ => &["id", "resource_id", "uuid"],
    }
}

fn extract_resource_id(rt: ResourceType, payload: &Value) -> Option<String> {
    if let Some(id) = payload
        .get(NOVA_OBJECT_DATA_KEY)
        .and_then(|d| d.get("uuid"))
        .and_then(Value::as_str)
    {
        return Some(id.to_string());
    }

    for field in resource_id_fields(rt) {
        if let Some(id) = str_field(payload, field) {
            return Some(id.to_string());
        }
    }

    payload
        .get("resource_info")
        .and_then(|info| info.get("id"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// Status field names tried, in order, within `payload` for each resource type.
fn status_fields(rt: ResourceType) -> &'static [&'static str] {
    match rt {
        ResourceType::Server => &["state", "status", "vm_state"],
        ResourceType::Volume | ResourceType::Snapshot | ResourceType::Backup => &["status"],
        ResourceType::Image => &["status"],
        ResourceType::Stack => &["state", "stack_status"],
        ResourceType::LoadBalancer => &["operating_status", "provisioning_status", "status"],
        _ => &["status", "state"],
    }
}

fn extract_status(rt: ResourceType, payload: &Value) -> Option<String> {
    if let Some(state) = payload
        .get(NOVA_OBJECT_DATA_KEY)
        .and_then(|d| d.get("state"))
        .and_then(Value::as_str)
    {
        return Some(state.to_lowercase());
    }

    for field in status_fields(rt) {
        if let Some(status) = str_field(payload, field) {
            return Some(status.to_lowercase());
        }
    }

    None
}

fn extract_old_status(payload: &Value) -> Option<String> {
    if let Some(old_state) = payload
        .get(NOVA_OBJECT_DATA_KEY)
        .and_then(|d| d.get("old_state"))
        .and_then(Value::as_str)
    {
        return Some(old_state.to_lowercase());
    }

    for field in ["old_state", "old_status", "previous_state"] {
        if let Some(old_status) = str_field(payload, field) {
            return Some(old_status.to_lowercase());
        }
    }

    None
}

/// Terminal-status membership table, keyed by resource type.
///
/// A resource with no status is never terminal; membership is tested against
/// the already-lower-cased status.
fn terminal_statuses(rt: ResourceType) -> &'static [&'static str] {
    match rt {
        ResourceType::Server => &[
            "active",
            "error",
            "deleted",
            "shutoff",
            "shelved_offloaded",
            "suspended",
            "paused",
            "stopped",
        ],
        ResourceType::Volume | ResourceType::Snapshot | ResourceType::Backup => &[
            "available",
            "in-use",
            "error",
            "deleted",
            "error_deleting",
            "error_restoring",
        ],
        ResourceType::Image => &["active", "killed", "deleted", "deactivated"],
        ResourceType::Stack => &[
            "create_complete",
            "create_failed",
            "update_complete",
            "update_failed",
            "delete_complete",
            "delete_failed",
            "rollback_complete",
            "rollback_failed",
        ],
        _ => &["active", "error", "deleted", "available", "down"],
    }
}

/// Whether `(resource_type, status)` is a terminal transition.
///
/// `status` is expected to already be lower-cased (as produced by
/// [`extract_status`]); an absent status is never terminal.
pub(crate) fn is_terminal(rt: ResourceType, status: Option<&str>) -> bool {
    match status {
        Some(status) => terminal_statuses(rt).contains(&status),
        None => false,
    }
}

const PHASE_SUFFIXES: &[&str] = &["start", "end", "error"];

/// Decompose the remainder of `event_type` (after stripping the matched
/// resource-type prefix) into `(action, phase)`.
fn decompose_event_type(event_type: &str, rt: ResourceType) -> (Option<String>, Option<String>) {
    let remainder = strip_prefix(event_type, rt);
    let segments: Vec<&str> = remainder.split('.').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return (None, None);
    }

    let action = segments[0].to_string();
    let phase = if segments.len() >= 2 && PHASE_SUFFIXES.contains(segments.last().unwrap()) {
        Some(segments.last().unwrap().to_string())
    } else {
        None
    };

    (Some(action), phase)
}

fn strip_prefix(event_type: &str, rt: ResourceType) -> String {
    let prefix = rt.prefix();
    if prefix.is_empty() {
        return event_type.to_string();
    }

    match event_type.strip_prefix(prefix) {
        Some(rest) => rest.strip_prefix('.').unwrap_or(rest).to_string(),
        None => event_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("compute.instance.create.end", Some("create"), Some("end"))]
    #[case("volume.delete.start", Some("delete"), Some("start"))]
    #[case("image.update", Some("update"), None)]
    #[case("compute.instance.power_on.end", Some("power_on"), Some("end"))]
    fn action_and_phase(#[case] event_type: &str, #[case] action: Option<&str>, #[case] phase: Option<&str>) {
        let rt = ResourceType::from_event_type(event_type);
        let (a, p) = decompose_event_type(event_type, rt);
        assert_eq!(a.as_deref(), action);
        assert_eq!(p.as_deref(), phase);
    }

    #[rstest]
    #[case(ResourceType::Server, "active", true)]
    #[case(ResourceType::Server, "building", false)]
    #[case(ResourceType::Volume, "in-use", true)]
    #[case(ResourceType::Volume, "creating", false)]
    #[case(ResourceType::Server, "ACTIVE", true)]
    fn terminal_classification(#[case] rt: ResourceType, #[case] status: &str, #[case] expected: bool) {
        assert_eq!(is_terminal(rt, Some(&status.to_lowercase())), expected);
    }

    #[test]
    fn absent_status_is_never_terminal() {
        assert!(!is_terminal(ResourceType::Server, None));
    }

    #[test]
    fn nova_versioned_payload_wins_over_other_fields() {
        let payload = json!({
            "nova_object.data": { "uuid": "X" },
            "instance_id": "should-not-be-used",
        });
        assert_eq!(
            extract_resource_id(ResourceType::Server, &payload),
            Some("X".to_string())
        );
    }

    #[test]
    fn bare_payload_uses_type_specific_field_list() {
        let payload = json!({"instance_id": "I"});
        assert_eq!(
            extract_resource_id(ResourceType::Server, &payload),
            Some("I".to_string())
        );
    }

    #[test]
    fn resource_info_is_the_last_resort() {
        let payload = json!({"resource_info": {"id": "R"}});
        assert_eq!(
            extract_resource_id(ResourceType::Unknown, &payload),
            Some("R".to_string())
        );
    }

    #[test]
    fn missing_event_type_yields_skip() {
        let notification = json!({"payload": {"id": "x"}});
        assert!(parse("c", "nova", &notification).is_none());
    }

    #[test]
    fn e2e_server_create_end() {
        let notification = json!({
            "event_type": "compute.instance.create.end",
            "timestamp": "2026-02-06 12:00:00.000000",
            "priority": "INFO",
            "payload": {"instance_id": "vm-1", "state": "active", "old_state": "building"}
        });
        let event = parse("c", "nova", &notification).unwrap();
        assert_eq!(event.cluster_id(), "c");
        assert_eq!(event.service(), "nova");
        assert_eq!(event.resource_type(), ResourceType::Server);
        assert_eq!(event.resource_id(), Some("vm-1"));
        assert_eq!(event.action(), Some("create"));
        assert_eq!(event.phase(), Some("end"));
        assert_eq!(event.status(), Some("active"));
        assert_eq!(event.old_status(), Some("building"));
        assert!(event.terminal());
        assert_eq!(event.timestamp().to_rfc3339(), "2026-02-06T12:00:00+00:00");
    }

    #[test]
    fn e2e_volume_delete_start() {
        let notification = json!({
            "event_type": "volume.delete.start",
            "payload": {"volume_id": "v-1", "status": "deleting"}
        });
        let event = parse("c", "cinder", &notification).unwrap();
        assert_eq!(event.resource_type(), ResourceType::Volume);
        assert_eq!(event.action(), Some("delete"));
        assert_eq!(event.phase(), Some("start"));
        assert!(!event.terminal());
    }

    #[test]
    fn e2e_image_update() {
        let notification = json!({
            "event_type": "image.update",
            "payload": {"id": "i-1", "status": "active"}
        });
        let event = parse("c", "glance", &notification).unwrap();
        assert_eq!(event.action(), Some("update"));
        assert_eq!(event.phase(), None);
        assert_eq!(event.resource_id(), Some("i-1"));
        assert!(event.terminal());
    }

    #[test]
    fn e2e_stack_create_end() {
        let notification = json!({
            "event_type": "orchestration.stack.create.end",
            "payload": {"stack_identity": "s-1", "state": "create_complete"}
        });
        let event = parse("c", "heat", &notification).unwrap();
        assert_eq!(event.resource_type(), ResourceType::Stack);
        assert_eq!(event.resource_id(), Some("s-1"));
        assert!(event.terminal());
    }

    #[test]
    fn parser_never_panics_on_unexpected_payload_shapes() {
        let notification = json!({"event_type": "compute.instance.create.end", "payload": "not-an-object"});
        let event = parse("c", "nova", &notification).unwrap();
        assert_eq!(event.resource_id(), None);
        assert_eq!(event.status(), None);
    }
}
