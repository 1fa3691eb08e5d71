//! Kafka-style log-broker transport, built on `rdkafka`.
//!
//! Unlike AMQP, a log broker uses a single consumer subscribed to many
//! topics; subscribe/unsubscribe mutate the topic set of one shared consumer
//! rather than opening a new connection per service. Topic names are derived
//! per service (`topic-override` extra, else `{exchange-or-service}.{topic}`)
//! and messages are routed back to a service by matching the topic the
//! message arrived on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::KafkaConfig;
use crate::error::{TransportError, TransportResult};
use crate::transport::{DeliveryCallback, ServiceEndpoint, Transport};

struct Subscription {
    topic: String,
    callback: DeliveryCallback,
}

type SubscriptionMap = Arc<RwLock<HashMap<String, Subscription>>>;

/// Kafka transport for a single cluster.
pub struct KafkaTransport {
    consumer: Arc<StreamConsumer>,
    poll_timeout: Duration,
    base_topic: String,
    running: AtomicBool,
    subscriptions: SubscriptionMap,
    worker: RwLock<Option<JoinHandle<()>>>,
}

impl KafkaTransport {
    /// Build a transport from the cluster's Kafka configuration.
    pub fn new(kafka: &KafkaConfig, base_topic: &str) -> TransportResult<Self> {
        if kafka.bootstrap_servers.is_empty() {
            return Err(TransportError::Configuration(
                "kafka.bootstrap_servers must be set for a kafka-transport cluster".to_string(),
            ));
        }

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &kafka.bootstrap_servers)
            .set("group.id", &kafka.group_id)
            .set("auto.offset.reset", &kafka.auto_offset_reset)
            .set(
                "enable.auto.commit",
                if kafka.enable_auto_commit { "true" } else { "false" },
            );

        if let Some(protocol) = &kafka.security_protocol {
            client_config.set("security.protocol", protocol);
        }
        if let Some(mechanism) = &kafka.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }
        if let Some(jaas) = &kafka.sasl_jaas_config {
            client_config.set("sasl.jaas.config", jaas);
        }
        for (key, value) in &kafka.extra {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e: KafkaError| TransportError::Connect {
                service: "kafka".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            consumer: Arc::new(consumer),
            poll_timeout: kafka.poll_timeout,
            base_topic: base_topic.to_string(),
            running: AtomicBool::new(false),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            worker: RwLock::new(None),
        })
    }

    fn topic_for(service: &str, endpoint: &ServiceEndpoint, base_topic: &str) -> String {
        if let Some(override_topic) = endpoint.topic_override() {
            return override_topic.to_string();
        }
        let prefix = endpoint.exchange().unwrap_or(service);
        format!("{prefix}.{base_topic}")
    }

    async fn resubscribe_consumer(&self) -> TransportResult<()> {
        let subscriptions = self.subscriptions.read().await;
        let topics: Vec<&str> = subscriptions.values().map(|s| s.topic.as_str()).collect();
        if topics.is_empty() {
            let _ = self.consumer.unsubscribe();
            return Ok(());
        }
        self.consumer
            .subscribe(&topics)
            .map_err(|e| TransportError::Subscribe {
                service: topics.join(","),
                source: Box::new(e),
            })
    }

    /// Map an inbound message's topic back to the service that registered it.
    /// Falls back to the substring before the first `.` when no exact match is
    /// registered.
    fn service_for_topic<'a>(
        subscriptions: &'a HashMap<String, Subscription>,
        topic: &str,
    ) -> Option<&'a str> {
        for (service, sub) in subscriptions {
            if sub.topic == topic {
                return Some(service.as_str());
            }
        }
        let prefix = topic.split('.').next()?;
        subscriptions
            .keys()
            .find(|service| service.as_str() == prefix)
            .map(String::as_str)
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn subscribe(
        &self,
        service: &str,
        endpoint: ServiceEndpoint,
        callback: DeliveryCallback,
    ) -> TransportResult<()> {
        let topic = Self::topic_for(service, &endpoint, &self.base_topic);

        self.subscriptions
            .write()
            .await
            .insert(service.to_string(), Subscription { topic, callback });

        if self.running.load(Ordering::Relaxed) {
            self.resubscribe_consumer().await?;
        }

        Ok(())
    }

    async fn unsubscribe(&self, service: &str) -> TransportResult<()> {
        let removed = self.subscriptions.write().await.remove(service).is_some();
        if removed && self.running.load(Ordering::Relaxed) {
            self.resubscribe_consumer().await?;
        }
        Ok(())
    }

    async fn start(&self) -> TransportResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Kafka transport already running, ignoring duplicate start");
            return Ok(());
        }

        self.resubscribe_consumer().await?;

        let consumer = Arc::clone(&self.consumer);
        let poll_timeout = self.poll_timeout;
        let subscriptions = Arc::clone(&self.subscriptions);

        // Stopped via `handle.abort()` in `close`, not a shared flag: the poll
        // loop blocks on `consumer.recv()`, so a flag it only checks between
        // iterations could leave it parked past shutdown.
        let handle = tokio::spawn(async move {
            poll_loop(consumer, poll_timeout, subscriptions).await;
        });

        *self.worker.write().await = Some(handle);

        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.write().await.take() {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        let _ = self.consumer.unsubscribe();
        Ok(())
    }

    fn active_count(&self) -> usize {
        self.subscriptions.try_read().map(|s| s.len()).unwrap_or(0)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

async fn poll_loop(consumer: Arc<StreamConsumer>, poll_timeout: Duration, subscriptions: SubscriptionMap) {
    loop {
        match tokio::time::timeout(poll_timeout, consumer.recv()).await {
            Ok(Ok(message)) => {
                let topic = message.topic().to_string();
                let payload = message.payload().map(|p| p.to_vec());
                let subs = subscriptions.read().await;
                if let (Some(service), Some(bytes)) =
                    (KafkaTransport::service_for_topic(&subs, &topic), payload)
                {
                    if let Some(sub) = subs.get(service) {
                        let callback = Arc::clone(&sub.callback);
                        let service = service.to_string();
                        drop(subs);
                        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            callback(&service, &bytes);
                        })) {
                            tracing::error!(service = %service, "delivery callback panicked: {e:?}");
                        }
                    }
                } else {
                    tracing::debug!(topic = %topic, "no subscription registered for topic, dropping message");
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Kafka poll failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(_elapsed) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_bootstrap_servers() {
        let config = KafkaConfig::default();
        let result = KafkaTransport::new(&config, "notifications");
        assert!(result.is_err());
    }

    #[test]
    fn topic_uses_override_when_present() {
        let endpoint = ServiceEndpoint::new().with_extra("topic-override", "custom.topic");
        assert_eq!(
            KafkaTransport::topic_for("nova", &endpoint, "notifications"),
            "custom.topic"
        );
    }

    #[test]
    fn topic_falls_back_to_exchange_or_service_plus_base_topic() {
        let endpoint = ServiceEndpoint::new();
        assert_eq!(
            KafkaTransport::topic_for("nova", &endpoint, "notifications"),
            "nova.notifications"
        );

        let endpoint = ServiceEndpoint::new().with_extra("exchange", "compute");
        assert_eq!(
            KafkaTransport::topic_for("nova", &endpoint, "notifications"),
            "compute.notifications"
        );
    }

    #[test]
    fn service_for_topic_matches_exact_then_prefix() {
        let mut subs = HashMap::new();
        subs.insert(
            "nova".to_string(),
            Subscription {
                topic: "compute.notifications".to_string(),
                callback: Arc::new(|_, _| {}),
            },
        );
        assert_eq!(
            KafkaTransport::service_for_topic(&subs, "compute.notifications"),
            Some("nova")
        );
        assert_eq!(KafkaTransport::service_for_topic(&subs, "unrelated.topic"), None);
    }

    fn test_config() -> KafkaConfig {
        KafkaConfig {
            bootstrap_servers: "localhost:9092".to_string(),
            group_id: "openstack-notify-test".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_moves_active_count_by_exactly_one() {
        let transport = KafkaTransport::new(&test_config(), "notifications").unwrap();
        assert_eq!(transport.active_count(), 0);

        transport
            .subscribe("nova", ServiceEndpoint::new(), Arc::new(|_, _| {}))
            .await
            .unwrap();
        assert_eq!(transport.active_count(), 1);

        transport.unsubscribe("nova").await.unwrap();
        assert_eq!(transport.active_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_of_an_absent_service_is_a_noop() {
        let transport = KafkaTransport::new(&test_config(), "notifications").unwrap();
        transport.unsubscribe("nova").await.unwrap();
        assert_eq!(transport.active_count(), 0);
    }
}
