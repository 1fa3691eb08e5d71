//! Per-cluster transport state: the constructed transport plus the service
//! endpoints it has been told to subscribe.

use std::collections::HashMap;
use std::sync::Arc;

use openstack_notify_transport::{ServiceConfig, ServiceEndpoint, Transport};

pub(crate) struct ClusterState {
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) services: HashMap<String, ServiceConfig>,
}

impl ClusterState {
    pub(crate) fn new() -> Self {
        Self {
            transport: None,
            services: HashMap::new(),
        }
    }
}

pub(crate) fn endpoint_from_config(config: &ServiceConfig) -> ServiceEndpoint {
    let mut endpoint = ServiceEndpoint::new();
    endpoint.username = config.username.clone();
    endpoint.password = config.password.clone();
    if let Some(vhost) = &config.vhost {
        endpoint = endpoint.with_extra("vhost", vhost.clone());
    }
    if let Some(exchange) = &config.exchange {
        endpoint = endpoint.with_extra("exchange", exchange.clone());
    }
    if let Some(topic_override) = &config.topic_override {
        endpoint = endpoint.with_extra("topic-override", topic_override.clone());
    }
    endpoint
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_credentials_and_extras() {
        let config = ServiceConfig {
            username: Some("nova".to_string()),
            password: Some("secret".to_string()),
            vhost: Some("/nova".to_string()),
            exchange: Some("compute".to_string()),
            topic_override: None,
        };
        let endpoint = endpoint_from_config(&config);
        assert_eq!(endpoint.username.as_deref(), Some("nova"));
        assert_eq!(endpoint.vhost(), Some("/nova"));
        assert_eq!(endpoint.exchange(), Some("compute"));
    }
}
