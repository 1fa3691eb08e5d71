//! The event manager: transport lifecycle, listener fan-out, and the
//! `bytes -> unwrap -> parse -> dispatch` pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use openstack_notify_core::{parse_notification, unwrap_envelope, OpenStackEvent};
use openstack_notify_transport::{build_transport, ClusterConfig, NotifyConfig, ServiceConfig, Transport};

use crate::cluster::{endpoint_from_config, ClusterState};
use crate::error::{ManagerError, ManagerResult};
use crate::listener::{Listener, ListenerSet};

/// Owns configuration, per-cluster transports, the listener set, and the
/// parse/dispatch pipeline.
///
/// `start` walks every configured cluster, builds its transport, subscribes
/// every configured service with a callback bound to `(cluster_id, service)`,
/// then calls `transport.start()`. A failure building or starting one
/// cluster's transport is logged and does not prevent other clusters from
/// starting.
pub struct EventManager {
    config: NotifyConfig,
    clusters: DashMap<String, Arc<Mutex<ClusterState>>>,
    listeners: Arc<ListenerSet>,
    running: AtomicBool,
}

impl EventManager {
    pub fn new(config: NotifyConfig) -> Self {
        let clusters = DashMap::new();
        for cluster_id in config.clusters.keys() {
            clusters.insert(cluster_id.clone(), Arc::new(Mutex::new(ClusterState::new())));
        }

        Self {
            config,
            clusters,
            listeners: Arc::new(ListenerSet::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Register a listener. Safe to call at any time, including while running.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.add(listener);
    }

    /// Remove a previously-registered listener.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        self.listeners.remove(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Build a transport for every configured cluster, subscribe its
    /// configured services, and start it. Per-cluster failures are logged and
    /// do not abort the remaining clusters.
    pub async fn start(&self) -> ManagerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("event manager already running, ignoring duplicate start");
            return Ok(());
        }

        for cluster_id in self.config.clusters.keys().cloned().collect::<Vec<_>>() {
            if let Err(e) = self.start_cluster(&cluster_id).await {
                tracing::error!(cluster = %cluster_id, error = %e, "failed to start cluster");
            }
        }

        Ok(())
    }

    async fn start_cluster(&self, cluster_id: &str) -> ManagerResult<()> {
        let cluster_config = self
            .config
            .clusters
            .get(cluster_id)
            .ok_or_else(|| ManagerError::NoSuchCluster(cluster_id.to_string()))?;

        let transport = build_transport(
            cluster_id,
            cluster_config,
            &self.config.topic,
            self.config.prefetch_count,
            self.config.reconnect_interval,
        )?;

        let cluster_state = Arc::clone(
            &self
                .clusters
                .entry(cluster_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ClusterState::new()))),
        );
        let mut state = cluster_state.lock().await;
        state.transport = Some(Arc::clone(&transport));

        for (service, service_config) in &cluster_config.services {
            let endpoint = endpoint_from_config(service_config);
            let callback = self.delivery_callback(cluster_id.to_string(), service.clone());
            if let Err(e) = transport.subscribe(service, endpoint, callback).await {
                tracing::warn!(cluster = %cluster_id, service = %service, error = %e, "failed to subscribe service");
            }
            state.services.insert(service.clone(), service_config.clone());
        }

        transport.start().await?;
        Ok(())
    }

    fn delivery_callback(
        &self,
        cluster_id: String,
        service: String,
    ) -> Arc<dyn Fn(&str, &[u8]) + Send + Sync> {
        let listeners = Arc::clone(&self.listeners);
        Arc::new(move |_service: &str, bytes: &[u8]| {
            dispatch_message(&cluster_id, &service, bytes, &listeners);
        })
    }

    /// Add a service to an already-running (or not-yet-started) cluster.
    /// Requires the cluster's transport to already exist.
    pub async fn add_service(
        &self,
        cluster_id: &str,
        service: &str,
        service_config: ServiceConfig,
    ) -> ManagerResult<()> {
        let cluster_state = self
            .clusters
            .get(cluster_id)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| ManagerError::NoSuchCluster(cluster_id.to_string()))?;
        let mut state = cluster_state.lock().await;
        let transport = state
            .transport
            .clone()
            .ok_or_else(|| ManagerError::NoTransport(cluster_id.to_string()))?;

        let endpoint = endpoint_from_config(&service_config);
        let callback = self.delivery_callback(cluster_id.to_string(), service.to_string());
        transport.subscribe(service, endpoint, callback).await?;
        state.services.insert(service.to_string(), service_config);
        Ok(())
    }

    /// Remove a service from a cluster; no-op if the cluster has no
    /// transport yet.
    pub async fn remove_service(&self, cluster_id: &str, service: &str) -> ManagerResult<()> {
        let cluster_state = self
            .clusters
            .get(cluster_id)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| ManagerError::NoSuchCluster(cluster_id.to_string()))?;
        let mut state = cluster_state.lock().await;
        if let Some(transport) = state.transport.clone() {
            transport.unsubscribe(service).await?;
        }
        state.services.remove(service);
        Ok(())
    }

    /// Replace a cluster's transport. Closes the prior transport first, then
    /// re-subscribes every previously-configured service on the new one.
    pub async fn set_transport(&self, cluster_id: &str, transport: Arc<dyn Transport>) -> ManagerResult<()> {
        let cluster_state = Arc::clone(
            &self
                .clusters
                .entry(cluster_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ClusterState::new()))),
        );
        let mut state = cluster_state.lock().await;

        if let Some(prior) = state.transport.take() {
            prior.close().await?;
        }

        for (service, service_config) in state.services.clone() {
            let endpoint = endpoint_from_config(&service_config);
            let callback = self.delivery_callback(cluster_id.to_string(), service.clone());
            transport.subscribe(&service, endpoint, callback).await?;
        }

        if self.running.load(Ordering::Relaxed) {
            transport.start().await?;
        }

        state.transport = Some(transport);
        Ok(())
    }

    /// Close every cluster's transport. Idempotent: individual close errors
    /// are logged, not propagated, so the sweep always completes.
    pub async fn close(&self) -> ManagerResult<()> {
        self.running.store(false, Ordering::SeqCst);

        let cluster_states: Vec<(String, Arc<Mutex<ClusterState>>)> = self
            .clusters
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (cluster_id, cluster_state) in cluster_states {
            let mut state = cluster_state.lock().await;
            if let Some(transport) = state.transport.take() {
                if let Err(e) = transport.close().await {
                    tracing::error!(cluster = %cluster_id, error = %e, "error closing transport");
                }
            }
        }
        Ok(())
    }

    pub async fn stop(&self) -> ManagerResult<()> {
        self.close().await
    }
}

fn dispatch_message(cluster_id: &str, service: &str, bytes: &[u8], listeners: &ListenerSet) {
    let notification = match unwrap_envelope(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(cluster = %cluster_id, service = %service, error = %e, "failed to unwrap notification envelope");
            tracing::debug!(cluster = %cluster_id, service = %service, body = %String::from_utf8_lossy(bytes), "raw body of unparseable notification");
            return;
        }
    };

    let event = match parse_notification(cluster_id, service, &notification) {
        Some(event) => event,
        None => {
            tracing::warn!(cluster = %cluster_id, service = %service, "notification missing event_type, dropping");
            return;
        }
    };

    listeners.dispatch(&event);
}

impl Drop for EventManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openstack_notify_transport::TransportKind;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn config_with_one_rabbitmq_cluster() -> NotifyConfig {
        let mut clusters = HashMap::new();
        let mut services = HashMap::new();
        services.insert("nova".to_string(), ServiceConfig::default());

        let mut cluster = ClusterConfig {
            transport: TransportKind::Rabbitmq,
            services,
            ..Default::default()
        };
        cluster.rabbitmq = Some(openstack_notify_transport::RabbitmqConfig {
            host: "localhost".to_string(),
            ..Default::default()
        });
        clusters.insert("cluster-a".to_string(), cluster);

        NotifyConfig {
            clusters,
            ..Default::default()
        }
    }

    #[test]
    fn new_manager_has_no_listeners_and_is_not_running() {
        let manager = EventManager::new(config_with_one_rabbitmq_cluster());
        assert_eq!(manager.listener_count(), 0);
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn close_before_start_is_a_safe_noop() {
        let manager = EventManager::new(config_with_one_rabbitmq_cluster());
        manager.close().await.unwrap();
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn add_service_without_a_transport_fails() {
        let manager = EventManager::new(NotifyConfig::default());
        manager
            .clusters
            .insert("cluster-a".to_string(), Arc::new(Mutex::new(ClusterState::new())));
        let result = manager
            .add_service("cluster-a", "nova", ServiceConfig::default())
            .await;
        assert!(matches!(result, Err(ManagerError::NoTransport(_))));
    }

    #[tokio::test]
    async fn add_service_on_unknown_cluster_fails() {
        let manager = EventManager::new(NotifyConfig::default());
        let result = manager
            .add_service("does-not-exist", "nova", ServiceConfig::default())
            .await;
        assert!(matches!(result, Err(ManagerError::NoSuchCluster(_))));
    }

    #[test]
    fn dispatch_is_isolated_per_listener() {
        let manager = EventManager::new(NotifyConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        manager.add_listener(Arc::new(|_: &OpenStackEvent| panic!("first listener explodes")));
        let calls_clone = Arc::clone(&calls);
        manager.add_listener(Arc::new(move |_: &OpenStackEvent| {
            calls_clone.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        dispatch_message(
            "cluster-a",
            "nova",
            br#"{"event_type": "compute.instance.create.end", "payload": {"instance_id": "abc"}}"#,
            &manager.listeners,
        );

        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn malformed_bytes_are_dropped_without_dispatching() {
        let manager = EventManager::new(NotifyConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        manager.add_listener(Arc::new(move |_: &OpenStackEvent| {
            calls_clone.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        dispatch_message("cluster-a", "nova", b"not json", &manager.listeners);

        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn missing_event_type_is_dropped_without_dispatching() {
        let manager = EventManager::new(NotifyConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        manager.add_listener(Arc::new(move |_: &OpenStackEvent| {
            calls_clone.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        dispatch_message("cluster-a", "nova", br#"{"payload": {}}"#, &manager.listeners);

        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    mockall::mock! {
        TestTransport {}

        #[async_trait::async_trait]
        impl openstack_notify_transport::Transport for TestTransport {
            async fn subscribe(
                &self,
                service: &str,
                endpoint: openstack_notify_transport::ServiceEndpoint,
                callback: openstack_notify_transport::DeliveryCallback,
            ) -> openstack_notify_transport::TransportResult<()>;
            async fn unsubscribe(&self, service: &str) -> openstack_notify_transport::TransportResult<()>;
            async fn start(&self) -> openstack_notify_transport::TransportResult<()>;
            async fn close(&self) -> openstack_notify_transport::TransportResult<()>;
            fn active_count(&self) -> usize;
            fn is_running(&self) -> bool;
        }
    }

    #[tokio::test]
    async fn set_transport_closes_prior_transport_before_resubscribing_on_the_new_one() {
        let manager = EventManager::new(NotifyConfig::default());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut old_transport = MockTestTransport::new();
        {
            let order = Arc::clone(&order);
            old_transport.expect_close().times(1).returning(move || {
                order.lock().unwrap().push("close-old");
                Ok(())
            });
        }

        let mut new_transport = MockTestTransport::new();
        {
            let order = Arc::clone(&order);
            new_transport
                .expect_subscribe()
                .times(1)
                .withf(|service, _, _| service == "nova")
                .returning(move |_, _, _| {
                    order.lock().unwrap().push("subscribe-new");
                    Ok(())
                });
        }
        new_transport.expect_start().times(0);

        let cluster_state = Arc::new(Mutex::new(ClusterState::new()));
        {
            let mut state = cluster_state.lock().await;
            state.transport = Some(Arc::new(old_transport));
            state.services.insert("nova".to_string(), ServiceConfig::default());
        }
        manager.clusters.insert("cluster-a".to_string(), cluster_state);

        manager
            .set_transport("cluster-a", Arc::new(new_transport))
            .await
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["close-old", "subscribe-new"]);
    }

    #[tokio::test]
    async fn add_service_then_remove_service_round_trips_through_the_transport() {
        let manager = EventManager::new(NotifyConfig::default());

        let mut transport = MockTestTransport::new();
        transport
            .expect_subscribe()
            .times(1)
            .withf(|service, _, _| service == "cinder")
            .returning(|_, _, _| Ok(()));
        transport
            .expect_unsubscribe()
            .times(1)
            .withf(|service| service == "cinder")
            .returning(|_| Ok(()));

        let cluster_state = Arc::new(Mutex::new(ClusterState::new()));
        cluster_state.lock().await.transport = Some(Arc::new(transport));
        manager.clusters.insert("cluster-a".to_string(), cluster_state);

        manager
            .add_service("cluster-a", "cinder", ServiceConfig::default())
            .await
            .unwrap();
        manager.remove_service("cluster-a", "cinder").await.unwrap();
    }
}
