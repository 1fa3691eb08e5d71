//! The canonical, immutable event value produced by the notification parser.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::resource::ResourceType;

/// A normalised OpenStack notification event.
///
/// Built exclusively through [`OpenStackEventBuilder`] so that the invariants in
/// the data model (required `cluster_id`/`event_type`, derived `resource_type`,
/// defaulted `timestamp`, deterministic `terminal`) hold for every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenStackEvent {
    cluster_id: String,
    service: String,
    resource_type: ResourceType,
    resource_id: Option<String>,
    event_type: String,
    action: Option<String>,
    phase: Option<String>,
    priority: Option<String>,
    publisher_id: Option<String>,
    message_id: Option<String>,
    timestamp: DateTime<Utc>,
    status: Option<String>,
    old_status: Option<String>,
    terminal: bool,
    payload: Option<Value>,
}

impl OpenStackEvent {
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    pub fn publisher_id(&self) -> Option<&str> {
        self.publisher_id.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn old_status(&self) -> Option<&str> {
        self.old_status.as_deref()
    }

    pub fn terminal(&self) -> bool {
        self.terminal
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Deserialize the preserved `payload` subtree into a caller-supplied type.
    ///
    /// Convenience wrapper over [`Self::payload`] for consumers that want a
    /// strongly-typed view of the raw payload rather than traversing
    /// `serde_json::Value` by hand.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.payload {
            Some(v) => serde_json::from_value(v.clone()),
            None => serde_json::from_value(Value::Null),
        }
    }
}

/// Builder for [`OpenStackEvent`].
///
/// This is a convenience, not a contract: the invariants live on the built
/// value, not on any particular construction path.
pub struct OpenStackEventBuilder {
    cluster_id: String,
    service: String,
    resource_type: Option<ResourceType>,
    resource_id: Option<String>,
    event_type: String,
    action: Option<String>,
    phase: Option<String>,
    priority: Option<String>,
    publisher_id: Option<String>,
    message_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    status: Option<String>,
    old_status: Option<String>,
    payload: Option<Value>,
}

impl OpenStackEventBuilder {
    pub fn new(cluster_id: impl Into<String>, service: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            service: service.into(),
            resource_type: None,
            resource_id: None,
            event_type: event_type.into(),
            action: None,
            phase: None,
            priority: None,
            publisher_id: None,
            message_id: None,
            timestamp: None,
            status: None,
            old_status: None,
            payload: None,
        }
    }

    pub fn resource_type(mut self, rt: ResourceType) -> Self {
        self.resource_type = Some(rt);
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn publisher_id(mut self, id: impl Into<String>) -> Self {
        self.publisher_id = Some(id.into());
        self
    }

    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn old_status(mut self, status: impl Into<String>) -> Self {
        self.old_status = Some(status.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Build the immutable event, applying the derivation and default rules
    /// from the data model.
    pub fn build(self) -> OpenStackEvent {
        let resource_type = self
            .resource_type
            .unwrap_or_else(|| ResourceType::from_event_type(&self.event_type));
        let terminal = crate::parser::is_terminal(resource_type, self.status.as_deref());

        OpenStackEvent {
            cluster_id: self.cluster_id,
            service: self.service,
            resource_type,
            resource_id: self.resource_id,
            event_type: self.event_type,
            action: self.action,
            phase: self.phase,
            priority: self.priority,
            publisher_id: self.publisher_id,
            message_id: self.message_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            status: self.status,
            old_status: self.old_status,
            terminal,
            payload: self.payload,
        }
    }
}
