//! # openstack-notify
//!
//! Consume OpenStack `oslo.messaging` notifications over classic AMQP 0-9-1
//! or a Kafka-style log broker, and dispatch them to application listeners as
//! a normalized [`OpenStackEvent`](openstack_notify_core::OpenStackEvent).
//!
//! ```rust,no_run
//! use openstack_notify::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ManagerError> {
//!     let config = NotifyConfig::default();
//!     let manager = EventManager::new(config);
//!
//!     manager.add_listener(Arc::new(|event: &OpenStackEvent| {
//!         println!("{:?} {} -> {:?}", event.resource_type(), event.event_type(), event.status());
//!     }));
//!
//!     manager.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! openstack-notify (facade)
//!     |
//! openstack-notify-manager (lifecycle, listener fan-out, dispatch pipeline)
//!     |
//! openstack-notify-transport (AMQP / Kafka-style broker transports)
//!     |
//! openstack-notify-core (envelope unwrap, parser, OpenStackEvent, ResourceType)
//! ```
//!
//! Broker backends are gated behind the `amqp` and `kafka` Cargo features
//! (both on by default). Building without a feature still compiles; a cluster
//! configured for a disabled backend fails fast with
//! [`TransportError::MissingClient`](openstack_notify_transport::TransportError::MissingClient)
//! instead of panicking.

pub use openstack_notify_core::{
    unwrap_envelope, EnvelopeError, EnvelopeResult, OpenStackEvent, OpenStackEventBuilder,
    ResourceType,
};
pub use openstack_notify_manager::{EventManager, Listener, ListenerSet, ManagerError, ManagerResult};
pub use openstack_notify_transport::{
    build_transport, ClusterConfig, KafkaConfig, NotifyConfig, RabbitmqConfig, ServiceConfig,
    ServiceEndpoint, Transport, TransportError, TransportKind, TransportResult,
};

pub mod prelude {
    pub use crate::{
        ClusterConfig, EventManager, KafkaConfig, Listener, ManagerError, ManagerResult,
        NotifyConfig, OpenStackEvent, OpenStackEventBuilder, RabbitmqConfig, ResourceType,
        ServiceConfig, Transport, TransportError, TransportKind,
    };
}
