//! Configuration schema consumed by the transport layer and the event manager.
//!
//! These are plain `serde::Deserialize`-able structs with `Default` impls
//! matching every documented default in the specification. Loading them from
//! YAML, TOML, or environment variables is explicitly the embedding
//! application's job — this crate only defines the shape the manager consumes.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration consumed by the event manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub topic: String,
    pub prefetch_count: u16,
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,
    pub clusters: HashMap<String, ClusterConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: default_topic(),
            prefetch_count: 10,
            reconnect_interval: Duration::from_secs(5),
            clusters: HashMap::new(),
        }
    }
}

fn default_topic() -> String {
    "notifications".to_string()
}

/// Which broker backend a cluster's transport is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Rabbitmq,
    Kafka,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Rabbitmq
    }
}

/// Per-cluster configuration: one broker backend, one set of services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub transport: TransportKind,
    pub rabbitmq: Option<RabbitmqConfig>,
    pub kafka: Option<KafkaConfig>,
    #[serde(alias = "vhosts")]
    pub services: HashMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RabbitmqConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    #[serde(with = "duration_millis")]
    pub connection_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub heartbeat: Duration,
}

impl Default for RabbitmqConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5672,
            ssl: false,
            connection_timeout: Duration::from_millis(10_000),
            heartbeat: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub enable_auto_commit: bool,
    pub max_poll_records: u32,
    #[serde(with = "duration_millis")]
    pub poll_timeout: Duration,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_jaas_config: Option<String>,
    /// Any additional librdkafka properties the caller wants applied verbatim.
    pub extra: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            group_id: String::new(),
            auto_offset_reset: "earliest".to_string(),
            enable_auto_commit: true,
            max_poll_records: 100,
            poll_timeout: Duration::from_millis(1000),
            security_protocol: None,
            sasl_mechanism: None,
            sasl_jaas_config: None,
            extra: HashMap::new(),
        }
    }
}

/// Per-service credentials and transport-specific extras.
///
/// Transports read only the extras keys they understand (`vhost`, `exchange`,
/// `topic_override`); unrecognised keys are ignored, not rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub vhost: Option<String>,
    pub exchange: Option<String>,
    pub topic_override: Option<String>,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
