//! Error types for envelope unwrapping and notification parsing.

use thiserror::Error;

/// Errors raised while unwrapping an oslo.messaging envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The outer bytes were not valid JSON.
    #[error("malformed outer JSON: {0}")]
    MalformedOuter(#[source] serde_json::Error),

    /// `oslo.message` was present but was not a JSON string, or the string it
    /// contained was not valid JSON.
    #[error("malformed inner oslo.message JSON: {0}")]
    MalformedInner(#[source] serde_json::Error),

    /// `oslo.message` was present but was not a string at all.
    #[error("oslo.message was not a string")]
    InnerNotString,
}

/// Result type for envelope unwrapping.
pub type EnvelopeResult<T> = std::result::Result<T, EnvelopeError>;
