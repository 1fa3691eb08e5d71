//! Closed enumeration of OpenStack resource kinds and event-type prefix matching.

/// The set of OpenStack resource kinds this crate understands.
///
/// Each variant is tagged with the `event_type` prefix oslo.messaging notifications
/// use for that resource (e.g. `compute.instance` for `SERVER`). `UNKNOWN` is the
/// fallback for event types that match no known prefix and is never itself a
/// match candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Server,
    Keypair,
    Volume,
    Snapshot,
    Backup,
    Image,
    Network,
    Subnet,
    Port,
    Router,
    FloatingIp,
    SecurityGroup,
    LoadBalancer,
    Listener,
    Pool,
    Project,
    User,
    Role,
    Stack,
    DnsZone,
    DnsRecordSet,
    Unknown,
}

/// All known (non-`Unknown`) resource kinds, longest prefix first.
///
/// Ordering matters: `from_event_type` must consider the longest matching prefix,
/// so entries whose prefix is a prefix of another entry's prefix must come after
/// it in this list. None of the prefixes below alias one another this way, but we
/// still sort candidates by prefix length at match time rather than relying on
/// declaration order, so this list may be declared in any order.
const KNOWN: &[ResourceType] = &[
    ResourceType::Server,
    ResourceType::Keypair,
    ResourceType::Volume,
    ResourceType::Snapshot,
    ResourceType::Backup,
    ResourceType::Image,
    ResourceType::Network,
    ResourceType::Subnet,
    ResourceType::Port,
    ResourceType::Router,
    ResourceType::FloatingIp,
    ResourceType::SecurityGroup,
    ResourceType::LoadBalancer,
    ResourceType::Listener,
    ResourceType::Pool,
    ResourceType::Project,
    ResourceType::User,
    ResourceType::Role,
    ResourceType::Stack,
    ResourceType::DnsZone,
    ResourceType::DnsRecordSet,
];

impl ResourceType {
    /// The `event_type` prefix associated with this resource kind.
    ///
    /// `Unknown` has no prefix of its own; it is the result of no match, not a
    /// match target.
    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceType::Server => "compute.instance",
            ResourceType::Keypair => "compute.keypair",
            ResourceType::Volume => "volume",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Backup => "backup",
            ResourceType::Image => "image",
            ResourceType::Network => "network",
            ResourceType::Subnet => "subnet",
            ResourceType::Port => "port",
            ResourceType::Router => "router",
            ResourceType::FloatingIp => "floatingip",
            ResourceType::SecurityGroup => "security_group",
            ResourceType::LoadBalancer => "loadbalancer",
            ResourceType::Listener => "listener",
            ResourceType::Pool => "pool",
            ResourceType::Project => "identity.project",
            ResourceType::User => "identity.user",
            ResourceType::Role => "identity.role",
            ResourceType::Stack => "orchestration.stack",
            ResourceType::DnsZone => "dns.zone",
            ResourceType::DnsRecordSet => "dns.recordset",
            ResourceType::Unknown => "",
        }
    }

    /// All known resource kinds (excludes `Unknown`).
    pub fn all() -> &'static [ResourceType] {
        KNOWN
    }

    /// Resolve a resource kind from an oslo.messaging `event_type` string by
    /// longest-prefix match.
    ///
    /// Matching is byte-wise and case-sensitive, since oslo event types are
    /// always lower-case. Returns `Unknown` when no known prefix matches.
    pub fn from_event_type(event_type: &str) -> ResourceType {
        KNOWN
            .iter()
            .filter(|rt| {
                let prefix = rt.prefix();
                event_type == prefix || event_type.starts_with(&format!("{prefix}."))
            })
            .max_by_key(|rt| rt.prefix().len())
            .copied()
            .unwrap_or(ResourceType::Unknown)
    }
}
