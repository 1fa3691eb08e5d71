//! Error types for broker transports.

use thiserror::Error;

/// Errors raised by a transport's lifecycle operations.
///
/// These surface to the caller of the specific operation that failed
/// (`subscribe`, `start`, `set_transport`, …); they must never abort
/// manager-wide or cluster-wide startup on their own — the manager decides
/// whether a per-service or per-cluster failure is fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to broker for service {service}: {source}")]
    Connect {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to declare topology for service {service}: {source}")]
    Topology {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to subscribe service {service}: {source}")]
    Subscribe {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(
        "the `{feature}` transport client library is not compiled into this build; \
         rebuild with `--features {feature}`"
    )]
    MissingClient { feature: &'static str },

    #[error("transport shutdown failed: {0}")]
    Shutdown(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
