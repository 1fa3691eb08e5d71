//! The transport service-provider interface (SPI).
//!
//! A transport owns the broker connection(s) for one cluster and delivers raw
//! message bytes to the manager through a per-service callback. All operations
//! are thread-safe; `close` is idempotent. Third parties can implement this
//! trait to plug in brokers other than the two built-ins (AMQP, Kafka-style log
//! broker) — the manager interacts with a transport solely through this
//! contract, via `set_transport`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;

/// Callback invoked with `(service_name, raw_bytes)` for every message a
/// transport receives. Exceptions/panics inside the callback are caught by the
/// transport and logged — they must never kill the consumer task/thread.
pub type DeliveryCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Credentials plus transport-specific extras for one `(cluster, service)`
/// endpoint.
///
/// Transports read only the extras keys they understand (`vhost`, `exchange`,
/// `topic-override`); unrecognised keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpoint {
    pub username: Option<String>,
    pub password: Option<String>,
    extras: HashMap<String, String>,
}

impl ServiceEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    pub fn vhost(&self) -> Option<&str> {
        self.extra("vhost")
    }

    pub fn exchange(&self) -> Option<&str> {
        self.extra("exchange")
    }

    pub fn topic_override(&self) -> Option<&str> {
        self.extra("topic-override")
    }
}

/// Lifecycle contract every broker transport must satisfy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register (or replace) the subscription for `service`.
    ///
    /// If the transport is already running, the subscription is activated
    /// immediately; otherwise it is deferred until `start`. Replacing an
    /// existing subscription releases the prior broker resources before
    /// installing the new one.
    async fn subscribe(
        &self,
        service: &str,
        endpoint: ServiceEndpoint,
        callback: DeliveryCallback,
    ) -> TransportResult<()>;

    /// Detach the consumer for `service` and release its broker resources.
    /// No-op if no subscription is registered for `service`.
    async fn unsubscribe(&self, service: &str) -> TransportResult<()>;

    /// Activate all registered subscriptions. Double-start is a no-op (logged
    /// at warn). Partial per-service failures are reported but do not abort
    /// the remaining services; the transport becomes `running` if the call
    /// returns at all.
    async fn start(&self) -> TransportResult<()>;

    /// Stop all consumers, release resources, clear subscriptions. Idempotent.
    async fn close(&self) -> TransportResult<()>;

    /// Number of currently active consumers.
    fn active_count(&self) -> usize;

    /// Whether the transport is currently running.
    fn is_running(&self) -> bool;
}
