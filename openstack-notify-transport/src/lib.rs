//! Pluggable broker transports for OpenStack-style notification delivery.
//!
//! This crate defines the [`Transport`] service-provider interface and ships
//! two built-ins behind Cargo features: an AMQP 0-9-1 transport (`amqp`,
//! default on) for classic `oslo.messaging` RabbitMQ deployments, and a
//! Kafka-style log-broker transport (`kafka`, default on) for clusters that
//! publish notifications onto a log broker instead. Disabling a feature drops
//! its client dependency entirely; attempting to build a transport of that
//! kind then fails with [`error::TransportError::MissingClient`] rather than
//! panicking or silently no-opping.

pub mod config;
pub mod error;
pub mod transport;

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::{ClusterConfig, KafkaConfig, NotifyConfig, RabbitmqConfig, ServiceConfig, TransportKind};
pub use error::{TransportError, TransportResult};
pub use transport::{DeliveryCallback, ServiceEndpoint, Transport};

use std::sync::Arc;
use std::time::Duration;

/// Build the transport for a cluster from its configuration, honoring the
/// compiled-in feature set.
pub fn build_transport(
    cluster_id: &str,
    cluster: &ClusterConfig,
    topic: &str,
    prefetch_count: u16,
    reconnect_interval: Duration,
) -> TransportResult<Arc<dyn Transport>> {
    match cluster.transport {
        TransportKind::Rabbitmq => {
            #[cfg(feature = "amqp")]
            {
                let rabbitmq = cluster.rabbitmq.clone().unwrap_or_default();
                let transport = amqp::AmqpTransport::new(
                    cluster_id,
                    cluster,
                    &rabbitmq,
                    topic,
                    prefetch_count,
                    reconnect_interval,
                )?;
                Ok(Arc::new(transport))
            }
            #[cfg(not(feature = "amqp"))]
            {
                let _ = (cluster_id, cluster, topic, prefetch_count, reconnect_interval);
                Err(TransportError::MissingClient { feature: "amqp" })
            }
        }
        TransportKind::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let kafka = cluster.kafka.clone().unwrap_or_default();
                let transport = kafka::KafkaTransport::new(&kafka, topic)?;
                Ok(Arc::new(transport))
            }
            #[cfg(not(feature = "kafka"))]
            {
                let _ = (cluster_id, cluster, topic, prefetch_count, reconnect_interval);
                Err(TransportError::MissingClient { feature: "kafka" })
            }
        }
    }
}
