//! Derived AMQP broker addresses.
//!
//! Kept as small, independently-testable pure functions — see the derived
//! broker addresses table in the specification.

use crate::transport::ServiceEndpoint;

/// Virtual host for a service's connection: the `vhost` extra if set, else
/// `"/" + service_name`.
pub fn vhost(service: &str, endpoint: &ServiceEndpoint) -> String {
    endpoint
        .vhost()
        .map(str::to_string)
        .unwrap_or_else(|| format!("/{service}"))
}

/// Topic exchange name: the `exchange` extra if set, else the service name.
pub fn exchange_name(service: &str, endpoint: &ServiceEndpoint) -> String {
    endpoint
        .exchange()
        .map(str::to_string)
        .unwrap_or_else(|| service.to_string())
}

/// Durable queue name: `openstack-event-{cluster_id}-{service}`.
pub fn queue_name(cluster_id: &str, service: &str) -> String {
    format!("openstack-event-{cluster_id}-{service}")
}

/// Routing-key bindings for a given base topic: `{topic}.info`, `{topic}.error`,
/// `{topic}.warn`.
///
/// Open question, preserved as specified: only these three priorities are
/// bound. Real deployments may emit additional priorities (e.g. `critical`,
/// `debug`, `audit`); this is intentional, not an oversight — do not silently
/// broaden it.
pub fn routing_keys(topic: &str) -> [String; 3] {
    [
        format!("{topic}.info"),
        format!("{topic}.error"),
        format!("{topic}.warn"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vhost_defaults_to_slash_plus_service_name() {
        let endpoint = ServiceEndpoint::new();
        assert_eq!(vhost("nova", &endpoint), "/nova");
    }

    #[test]
    fn vhost_extra_overrides_default() {
        let endpoint = ServiceEndpoint::new().with_extra("vhost", "/custom");
        assert_eq!(vhost("nova", &endpoint), "/custom");
    }

    #[test]
    fn queue_name_follows_derived_pattern() {
        assert_eq!(queue_name("prod", "nova"), "openstack-event-prod-nova");
    }

    #[test]
    fn routing_keys_are_the_three_fixed_priorities() {
        assert_eq!(
            routing_keys("notifications"),
            [
                "notifications.info".to_string(),
                "notifications.error".to_string(),
                "notifications.warn".to_string(),
            ]
        );
    }
}
