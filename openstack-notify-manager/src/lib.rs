//! Event manager: owns transport lifecycle, listener fan-out, and the
//! `bytes -> unwrap -> parse -> dispatch` pipeline for OpenStack-style
//! notifications.

pub mod cluster;
pub mod error;
pub mod listener;
pub mod manager;

pub use error::{ManagerError, ManagerResult};
pub use listener::{Listener, ListenerSet};
pub use manager::EventManager;

pub mod prelude {
    pub use crate::{EventManager, Listener, ManagerError, ManagerResult};
    pub use openstack_notify_core::{OpenStackEvent, OpenStackEventBuilder, ResourceType};
    pub use openstack_notify_transport::{
        ClusterConfig, KafkaConfig, NotifyConfig, RabbitmqConfig, ServiceConfig, TransportKind,
    };
}
