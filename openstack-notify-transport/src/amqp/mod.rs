//! AMQP 0-9-1 broker transport, built on `lapin`.
//!
//! One session per subscribed service: each gets its own connection, channel,
//! topic exchange, durable queue, and priority routing-key bindings. Sessions
//! reconnect on failure after `reconnect_interval` rather than aborting —
//! `lapin` has no built-in auto-recovery, so that loop is hand-rolled here.

mod addressing;
mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::{ClusterConfig, RabbitmqConfig};
use crate::error::{TransportError, TransportResult};
use crate::transport::{DeliveryCallback, ServiceEndpoint, Transport};

use session::{AmqpConnectParams, AmqpSession};

/// AMQP transport for a single cluster.
///
/// Subscriptions registered before `start` are held pending; `start` spins up
/// a session per pending subscription. Subscriptions registered after `start`
/// are activated immediately.
pub struct AmqpTransport {
    cluster_id: String,
    params: AmqpConnectParams,
    running: AtomicBool,
    sessions: Mutex<HashMap<String, AmqpSession>>,
    pending: Mutex<HashMap<String, (ServiceEndpoint, DeliveryCallback)>>,
}

impl AmqpTransport {
    /// Build a transport from the cluster's RabbitMQ configuration.
    pub fn new(
        cluster_id: &str,
        _cluster: &ClusterConfig,
        rabbitmq: &RabbitmqConfig,
        topic: &str,
        prefetch_count: u16,
        reconnect_interval: std::time::Duration,
    ) -> TransportResult<Self> {
        if rabbitmq.host.is_empty() {
            return Err(TransportError::Configuration(
                "rabbitmq.host must be set for a rabbitmq-transport cluster".to_string(),
            ));
        }

        Ok(Self {
            cluster_id: cluster_id.to_string(),
            params: AmqpConnectParams {
                host: rabbitmq.host.clone(),
                port: rabbitmq.port,
                ssl: rabbitmq.ssl,
                username: None,
                password: None,
                heartbeat: rabbitmq.heartbeat,
                reconnect_interval,
                prefetch_count,
                topic: topic.to_string(),
            },
            running: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn subscribe(
        &self,
        service: &str,
        endpoint: ServiceEndpoint,
        callback: DeliveryCallback,
    ) -> TransportResult<()> {
        // Replacing an existing subscription releases the prior session first.
        let mut sessions = self.sessions.lock().await;
        if let Some(prior) = sessions.remove(service) {
            prior.stop().await;
        }

        if self.running.load(Ordering::Relaxed) {
            let session = AmqpSession::start(
                self.cluster_id.clone(),
                service.to_string(),
                endpoint,
                self.params.clone(),
                callback,
            );
            sessions.insert(service.to_string(), session);
        } else {
            drop(sessions);
            self.pending
                .lock()
                .await
                .insert(service.to_string(), (endpoint, callback));
        }

        Ok(())
    }

    async fn unsubscribe(&self, service: &str) -> TransportResult<()> {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(service) {
            Some(session) => {
                session.stop().await;
                Ok(())
            }
            None => {
                self.pending.lock().await.remove(service);
                Ok(())
            }
        }
    }

    async fn start(&self) -> TransportResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("AMQP transport already running, ignoring duplicate start");
            return Ok(());
        }

        let pending: Vec<_> = self.pending.lock().await.drain().collect();
        let mut sessions = self.sessions.lock().await;
        for (service, (endpoint, callback)) in pending {
            let session = AmqpSession::start(
                self.cluster_id.clone(),
                service.clone(),
                endpoint,
                self.params.clone(),
                callback,
            );
            sessions.insert(service, session);
        }

        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.running.store(false, Ordering::SeqCst);

        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        for (_service, session) in sessions {
            session.stop().await;
        }
        self.pending.lock().await.clear();

        Ok(())
    }

    fn active_count(&self) -> usize {
        self.sessions
            .try_lock()
            .map(|s| s.len())
            .unwrap_or(0)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
