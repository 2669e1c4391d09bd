//! The data model shared across the facade boundary: instances, volumes,
//! load balancers, and the handful of value types that travel with them.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

/// The provider configuration, with exactly one mandatory field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// An availability-zone string, e.g. `us-east-1a`.
    pub zone: String,
    /// A free-form label used to scope resources to this cluster.
    pub cluster_tag: Option<String>,
}

impl CloudConfig {
    /// The region derived from `zone` by stripping the trailing AZ letter.
    ///
    /// Callers are expected to have already validated `zone` via
    /// [`crate::config::validate_zone`]; this is a pure, infallible
    /// transformation of an already-valid string.
    pub fn region(&self) -> &str {
        region_of(&self.zone)
    }
}

/// Strips the trailing AZ letter off a zone string to produce a region.
pub fn region_of(zone: &str) -> &str {
    zone.trim_end_matches(|c: char| c.is_ascii_alphabetic())
}

/// The known-regions set the Config Loader validates the derived region
/// against. A fixed program constant (spec.md §4.1, §9).
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
];

/// `FailureDomain`/`Region` pair returned by `Zones::zone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub failure_domain: String,
    pub region: String,
}

/// Lifecycle state of a cloud instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    /// `pending` and `running` are "alive"; every other state is not.
    pub fn is_alive(self) -> bool {
        matches!(self, InstanceState::Pending | InstanceState::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A single device-to-volume mapping as reported by the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub volume_id: String,
}

/// An opaque cloud-side VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub private_dns_name: String,
    /// `Err(raw)` when the cloud reported a private IP string that failed
    /// to parse; the error is only raised to the caller at the point
    /// something actually needs the address (spec.md §4.4 "Invalid
    /// address strings fail with `DataInvalid`"), not by dropping the
    /// instance from every listing.
    pub private_ip: Result<Ipv4Addr, String>,
    pub public_ip: Option<Ipv4Addr>,
    pub availability_zone: String,
    pub instance_type: String,
    pub state: InstanceState,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    pub tags: HashMap<String, String>,
}

/// The three address kinds `Instances::node_addresses` returns, in the
/// fixed order spec.md §4.4/§8 (S6) requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAddress {
    InternalIp(Ipv4Addr),
    /// The same value as `InternalIp`, duplicated under a legacy tag for
    /// callers that have not migrated off it.
    LegacyHostIp(Ipv4Addr),
    ExternalIp(Ipv4Addr),
}

/// Milli-CPU-equivalents and binary-unit memory for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeResources {
    pub milli_cpu: u64,
    pub memory_bytes: u64,
}

const GIB: u64 = 1 << 30;

impl NodeResources {
    pub const fn new(cpus: u64, memory_gib: u64) -> Self {
        NodeResources {
            milli_cpu: cpus * 1000,
            memory_bytes: memory_gib * GIB,
        }
    }
}

/// Attachment state of a single volume attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Attaching,
    Attached,
    Detaching,
    Detached,
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachmentState::Attaching => "attaching",
            AttachmentState::Attached => "attached",
            AttachmentState::Detaching => "detaching",
            AttachmentState::Detached => "detached",
        };
        f.write_str(s)
    }
}

/// A single attachment of a volume to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
    pub instance_id: String,
    pub device: String,
    pub state: AttachmentState,
}

/// An opaque cloud-side block device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub volume_id: String,
    pub availability_zone: String,
    pub attachments: Vec<VolumeAttachment>,
}

/// An ingress permission tuple, compared as a whole tuple (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IngressPermission {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

/// A cloud-side firewall object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub group_id: String,
    pub vpc_id: String,
    pub name: String,
    pub permissions: Vec<IngressPermission>,
}

/// A logically isolated virtual network inside the cloud account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub vpc_id: String,
    pub tags: HashMap<String, String>,
}

/// A range of IPs within a VPC, bound to exactly one AZ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub availability_zone: String,
}

/// The transport protocols a listener can forward. Only TCP is in scope
/// (spec.md §1 Non-goals exclude HTTP/HTTPS with session stickiness).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    pub fn as_lower_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

/// A single requested service port, as handed down by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePort {
    pub protocol: Protocol,
    pub port: u16,
    /// The port on the backend instance. `0` means "not yet assigned";
    /// such ports are skipped with a warning (spec.md §4.6 step 6).
    pub node_port: u16,
}

/// An LB rule mapping `(external port, protocol)` to `(backend port,
/// protocol)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub load_balancer_port: u16,
    pub instance_port: u16,
    pub protocol: String,
}

/// Session affinity requested for a load balancer. Only `None` is
/// supported; every other variant is rejected with `UnsupportedAffinity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAffinity {
    None,
    Other(String),
}

/// The spec handed to the facade's `LoadBalancing::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub listeners: Vec<Listener>,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

/// What the facade reports back about an existing or newly created load
/// balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerDescription {
    pub name: String,
    pub dns_name: String,
    pub instance_ids: Vec<String>,
    pub security_group_id: Option<String>,
    pub subnets: Vec<String>,
}

/// A single `Ingress` entry in the status the orchestrator consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerIngress {
    pub hostname: String,
}

/// `{Ingress: [{Hostname: ...}]}` (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerStatus {
    pub ingress: Vec<LoadBalancerIngress>,
}

impl LoadBalancerStatus {
    pub fn single_hostname(hostname: impl Into<String>) -> Self {
        LoadBalancerStatus {
            ingress: vec![LoadBalancerIngress {
                hostname: hostname.into(),
            }],
        }
    }
}
