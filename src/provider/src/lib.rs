//! Cloud-provider-agnostic capability surface for a container-orchestration
//! control plane: the traits an orchestrator consumes, the data model that
//! crosses the facade boundary, and the shared error taxonomy.
//!
//! Nothing in this crate depends on a vendor cloud SDK. `ccp-provider-aws`
//! is the AWS-backed implementation of the traits defined here.

pub mod device;
pub mod error;
pub mod resources;
pub mod traits;
pub mod types;
pub mod volume_name;

pub use error::{ProviderError, Result};
pub use traits::{
    CloudProvider, CloudServices, ComputeService, Instances, LoadBalancingService,
    MetadataResolver, TcpLoadBalancer, Volumes, Zones,
};
pub use volume_name::CanonicalVolumeName;
