//! Per-service AMQP session: connection, topic exchange, durable queue,
//! priority bindings, and a supervised consumer task with reconnect back-off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::StreamExt;
use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::task::JoinHandle;

use crate::amqp::addressing::{exchange_name, queue_name, routing_keys, vhost};
use crate::error::{TransportError, TransportResult};
use crate::transport::{DeliveryCallback, ServiceEndpoint};

/// Connection parameters shared by every service session in a cluster.
#[derive(Debug, Clone)]
pub struct AmqpConnectParams {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub heartbeat: Duration,
    pub reconnect_interval: Duration,
    pub prefetch_count: u16,
    pub topic: String,
}

/// A running AMQP session for one `(cluster, service)` pair.
///
/// Owns the background task that (re)connects, declares topology, consumes,
/// and reconnects on failure after `reconnect_interval` until told to stop.
pub struct AmqpSession {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AmqpSession {
    /// Start a new session. Connection/topology setup happens inside the
    /// spawned task so that transient startup failures are retried rather than
    /// failing `subscribe` outright; the caller only needs to know the task
    /// was scheduled.
    pub fn start(
        cluster_id: String,
        service: String,
        endpoint: ServiceEndpoint,
        params: AmqpConnectParams,
        callback: DeliveryCallback,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let task_active = Arc::clone(&active);

        let task = tokio::spawn(async move {
            run_session(cluster_id, service, endpoint, params, callback, task_active).await;
        });

        Self { active, task }
    }

    /// Stop the session: signal the background task to stop reconnecting and
    /// tear down the current connection, then wait for it to finish.
    ///
    /// Tolerant of an already-stopped session.
    pub async fn stop(self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
        let _ = self.task.await;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

async fn run_session(
    cluster_id: String,
    service: String,
    endpoint: ServiceEndpoint,
    params: AmqpConnectParams,
    callback: DeliveryCallback,
    active: Arc<AtomicBool>,
) {
    while active.load(Ordering::Relaxed) {
        match connect_and_consume(&cluster_id, &service, &endpoint, &params, &callback, &active).await {
            Ok(()) => {
                // Consumer stream ended cleanly (channel/connection closed).
            }
            Err(e) => {
                tracing::warn!(
                    cluster = %cluster_id,
                    service = %service,
                    error = %e,
                    "AMQP session for service failed, will retry after backoff"
                );
            }
        }

        if !active.load(Ordering::Relaxed) {
            break;
        }

        tokio::time::sleep(params.reconnect_interval).await;
    }
}

async fn connect_and_consume(
    cluster_id: &str,
    service: &str,
    endpoint: &ServiceEndpoint,
    params: &AmqpConnectParams,
    callback: &DeliveryCallback,
    active: &Arc<AtomicBool>,
) -> TransportResult<()> {
    let scheme = if params.ssl { "amqps" } else { "amqp" };
    let vhost_path = vhost(service, endpoint);
    let uri = format!(
        "{scheme}://{user}:{pass}@{host}:{port}/{vhost}?heartbeat={heartbeat}",
        user = endpoint.username.as_deref().or(params.username.as_deref()).unwrap_or("guest"),
        pass = endpoint.password.as_deref().or(params.password.as_deref()).unwrap_or("guest"),
        host = params.host,
        port = params.port,
        vhost = percent_encode_vhost(&vhost_path),
        heartbeat = params.heartbeat.as_secs(),
    );

    let connection_properties =
        ConnectionProperties::default().with_connection_name(queue_name(cluster_id, service).into());

    let connection = Connection::connect(&uri, connection_properties)
        .await
        .map_err(|e| TransportError::Connect {
            service: service.to_string(),
            source: Box::new(e),
        })?;

    let channel = connection.create_channel().await.map_err(|e| TransportError::Connect {
        service: service.to_string(),
        source: Box::new(e),
    })?;

    declare_topology(&channel, cluster_id, service, endpoint, params).await?;

    let queue = queue_name(cluster_id, service);
    let consumer_tag = format!("{queue}-consumer");

    let mut consumer = channel
        .basic_consume(
            &queue,
            &consumer_tag,
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            Default::default(),
        )
        .await
        .map_err(|e| TransportError::Subscribe {
            service: service.to_string(),
            source: Box::new(e),
        })?;

    while active.load(Ordering::Relaxed) {
        match consumer.next().await {
            Some(Ok(delivery)) => {
                if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(service, &delivery.data);
                })) {
                    tracing::error!(service = %service, "delivery callback panicked: {e:?}");
                }
            }
            Some(Err(e)) => {
                return Err(TransportError::Subscribe {
                    service: service.to_string(),
                    source: Box::new(e),
                });
            }
            None => break,
        }
    }

    let _ = channel
        .basic_cancel(&consumer_tag, BasicCancelOptions::default())
        .await;
    let _ = channel.close(200, "shutdown").await;
    let _ = connection.close(200, "shutdown").await;

    Ok(())
}

async fn declare_topology(
    channel: &Channel,
    cluster_id: &str,
    service: &str,
    endpoint: &ServiceEndpoint,
    params: &AmqpConnectParams,
) -> TransportResult<()> {
    channel
        .basic_qos(params.prefetch_count, BasicQosOptions::default())
        .await
        .map_err(|e| TransportError::Topology {
            service: service.to_string(),
            source: Box::new(e),
        })?;

    let exchange = exchange_name(service, endpoint);
    channel
        .exchange_declare(
            &exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            Default::default(),
        )
        .await
        .map_err(|e| TransportError::Topology {
            service: service.to_string(),
            source: Box::new(e),
        })?;

    let queue = queue_name(cluster_id, service);
    channel
        .queue_declare(
            &queue,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                ..Default::default()
            },
            Default::default(),
        )
        .await
        .map_err(|e| TransportError::Topology {
            service: service.to_string(),
            source: Box::new(e),
        })?;

    for routing_key in routing_keys(&params.topic) {
        channel
            .queue_bind(
                &queue,
                &exchange,
                &routing_key,
                QueueBindOptions::default(),
                Default::default(),
            )
            .await
            .map_err(|e| TransportError::Topology {
                service: service.to_string(),
                source: Box::new(e),
            })?;
    }

    Ok(())
}

fn percent_encode_vhost(vhost: &str) -> String {
    vhost.replace('/', "%2F")
}
