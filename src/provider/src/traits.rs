//! The capability surface the orchestrator consumes (spec.md §4.4–§4.7),
//! and the narrower Cloud Services Facade the capability implementations
//! are built on top of (spec.md §4.3). No trait here names a vendor SDK
//! type; `ccp-provider-aws`'s `Real` facade is the only place that does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{
    Instance, IngressPermission, LoadBalancerDescription, LoadBalancerSpec, NodeAddress,
    NodeResources, SecurityGroup, ServiceAffinity, ServicePort, Subnet, Volume, Vpc, Zone,
};

/// Resolves logical node names to cloud instances and reports their
/// addresses, identity, and allocatable resources (spec.md §4.4).
#[async_trait]
pub trait Instances: Send + Sync {
    /// The ordered address list for the node: internal IP, the same value
    /// again under the legacy tag, then the public IP if present.
    async fn node_addresses(&self, name: &str) -> Result<Vec<NodeAddress>, ProviderError>;

    /// `/<availability-zone>/<instance-id>`.
    async fn instance_id(&self, name: &str) -> Result<String, ProviderError>;

    /// The raw cloud instance id.
    async fn external_id(&self, name: &str) -> Result<String, ProviderError>;

    /// All alive instances whose `Name` tag matches `name_regexp`,
    /// excluding ones still `pending`. Surrounding quotes in `name_regexp`
    /// are stripped before compilation.
    async fn list(&self, name_regexp: &str) -> Result<Vec<String>, ProviderError>;

    /// The node's allocatable resources, or a null record for an
    /// unrecognized instance type.
    async fn node_resources(&self, name: &str) -> Result<NodeResources, ProviderError>;
}

/// Reports the zone/region the provider was configured for.
pub trait Zones: Send + Sync {
    /// Panics if called before the provider's configuration has been
    /// loaded — treated as a programmer error (spec.md §4.4).
    fn zone(&self) -> Zone;
}

/// Persistent block volume lifecycle (spec.md §4.5).
#[async_trait]
pub trait Volumes: Send + Sync {
    /// Attaches `volume_name` to `instance_name` (the empty string means
    /// "self"), returning the in-guest device path. Fails with
    /// `ReadOnlyUnsupported` if `read_only` is set.
    async fn attach_disk(
        &self,
        volume_name: &str,
        instance_name: &str,
        read_only: bool,
    ) -> Result<String, ProviderError>;

    /// Detaches `volume_name` from `instance_name` and waits for the
    /// cloud to report it detached.
    async fn detach_disk(&self, volume_name: &str, instance_name: &str) -> Result<(), ProviderError>;

    /// Creates a new volume of at least `capacity_mb` (rounded up to the
    /// nearest GB) in the provider's own AZ, returning its canonical name.
    async fn create_volume(
        &self,
        capacity_mb: u64,
        tags: HashMap<String, String>,
    ) -> Result<String, ProviderError>;

    /// Deletes the volume identified by its canonical name.
    async fn delete_volume(&self, volume_name: &str) -> Result<(), ProviderError>;
}

/// Idempotent L4 load balancer lifecycle, scoped to `(region, name)`
/// (spec.md §4.6).
#[async_trait]
pub trait TcpLoadBalancer: Send + Sync {
    /// Creates the load balancer if absent, or adopts it (without
    /// reconfiguring listeners) if one by this name already exists.
    /// `public_ip` is rejected outright with `PublicIpNotSupported`: the
    /// cloud always assigns the LB's address.
    async fn ensure_tcp_load_balancer(
        &self,
        name: &str,
        region: &str,
        hosts: &[String],
        ports: &[ServicePort],
        affinity: ServiceAffinity,
        public_ip: Option<std::net::Ipv4Addr>,
    ) -> Result<crate::types::LoadBalancerStatus, ProviderError>;

    /// Diffs the registered instance set against `hosts` and issues a
    /// single register/deregister call for the difference. Fails with
    /// `NotFound` if the load balancer does not exist.
    async fn update_tcp_load_balancer(
        &self,
        name: &str,
        region: &str,
        hosts: &[String],
    ) -> Result<(), ProviderError>;

    /// Deletes the load balancer, succeeding if it is already absent.
    async fn delete_tcp_load_balancer(&self, name: &str, region: &str) -> Result<(), ProviderError>;

    async fn tcp_load_balancer_exists(&self, name: &str, region: &str) -> Result<bool, ProviderError>;

    async fn get_tcp_load_balancer(
        &self,
        name: &str,
        region: &str,
    ) -> Result<Option<crate::types::LoadBalancerStatus>, ProviderError>;
}

/// A cloud provider's provider-wide identity, composed from the four
/// capability traits above.
pub trait CloudProvider: Instances + Zones + Volumes + TcpLoadBalancer {
    fn provider_name(&self) -> &'static str {
        "aws"
    }
}

impl<T: Instances + Zones + Volumes + TcpLoadBalancer> CloudProvider for T {}

// ---------------------------------------------------------------------
// Cloud Services Facade (spec.md §4.3)
// ---------------------------------------------------------------------

/// Compute (EC2-like) operations.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Lists instances, transparently paginating until the cloud's
    /// continuation token is exhausted. Alive instances only.
    async fn describe_instances(
        &self,
        instance_ids: &[String],
        private_dns_name_filter: Option<&str>,
    ) -> Result<Vec<Instance>, ProviderError>;

    async fn attach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError>;

    async fn detach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError>;

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume, ProviderError>;

    async fn create_volume(
        &self,
        availability_zone: &str,
        size_gb: i32,
        tags: &HashMap<String, String>,
    ) -> Result<String, ProviderError>;

    async fn delete_volume(&self, volume_id: &str) -> Result<(), ProviderError>;

    async fn describe_security_group_by_name(
        &self,
        vpc_id: &str,
        name: &str,
    ) -> Result<Vec<SecurityGroup>, ProviderError>;

    async fn describe_security_group_by_id(
        &self,
        group_id: &str,
    ) -> Result<Vec<SecurityGroup>, ProviderError>;

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> Result<SecurityGroup, ProviderError>;

    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: &[IngressPermission],
    ) -> Result<(), ProviderError>;

    async fn describe_vpcs_by_tag(&self, key: &str, value: &str) -> Result<Vec<Vpc>, ProviderError>;

    async fn describe_subnets(&self, vpc_id: &str) -> Result<Vec<Subnet>, ProviderError>;
}

/// LoadBalancing (ELB-like) operations.
#[async_trait]
pub trait LoadBalancingService: Send + Sync {
    async fn describe(&self, name: &str) -> Result<Option<LoadBalancerDescription>, ProviderError>;

    async fn create(&self, spec: &LoadBalancerSpec) -> Result<LoadBalancerDescription, ProviderError>;

    async fn delete(&self, name: &str) -> Result<(), ProviderError>;

    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<(), ProviderError>;

    async fn deregister_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<(), ProviderError>;
}

/// A tiny client for the instance-local metadata endpoint (spec.md §4.2).
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Fetches `http://169.254.169.254/latest/meta-data/<key>`. No
    /// retries, no caching: failures surface directly as
    /// `MetadataUnavailable`.
    async fn get(&self, key: &str) -> Result<String, ProviderError>;
}

/// The narrow capability boundary abstracting the three remote services.
/// All code above this point takes the facade by handle; no code in the
/// core imports vendor SDK symbols directly (spec.md §9).
///
/// `compute`/`load_balancing` are `async` because a `Real` implementation
/// builds a region-scoped SDK client lazily, which itself requires
/// resolving credentials over the network; see `SPEC_FULL.md` §4.3.
#[async_trait]
pub trait CloudServices: Send + Sync {
    async fn compute(&self, region: &str) -> Arc<dyn ComputeService>;
    async fn load_balancing(&self, region: &str) -> Arc<dyn LoadBalancingService>;
    fn metadata(&self) -> Arc<dyn MetadataResolver>;
}
