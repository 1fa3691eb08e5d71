//! # openstack-notify-core
//!
//! Normalised event model, envelope unwrapping, and notification parsing for
//! OpenStack `oslo.messaging` notifications.
//!
//! This crate has no networking or broker dependencies of its own — it is the
//! pure transformation `raw bytes -> OpenStackEvent` shared by every transport
//! in `openstack-notify-transport` and orchestrated by `openstack-notify-manager`.
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> envelope::unwrap -> serde_json::Value -> parser::parse -> OpenStackEvent
//! ```

pub mod envelope;
pub mod error;
pub mod event;
pub mod parser;
pub mod resource;

pub use envelope::unwrap as unwrap_envelope;
pub use error::{EnvelopeError, EnvelopeResult};
pub use event::{OpenStackEvent, OpenStackEventBuilder};
pub use parser::parse as parse_notification;
pub use resource::ResourceType;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{EnvelopeError, OpenStackEvent, OpenStackEventBuilder, ResourceType};
}
