//! Error types for the event manager.

use thiserror::Error;

/// Errors raised by [`crate::manager::EventManager`] operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("transport error: {0}")]
    Transport(#[from] openstack_notify_transport::TransportError),

    #[error("no such cluster: {0}")]
    NoSuchCluster(String),

    #[error("cluster {0} has no transport yet; call set_transport first")]
    NoTransport(String),
}

/// Result type for event manager operations.
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
