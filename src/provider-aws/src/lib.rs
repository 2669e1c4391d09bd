//! AWS-backed implementation of the cloud provider capability surface:
//! `AwsCloudProvider` composes the Config Loader, Metadata Resolver,
//! Cloud Services Facade, and Instance Registry described in
//! `SPEC_FULL.md` §2, and implements the `Instances`/`Zones`/`Volumes`/
//! `TcpLoadBalancer` traits `ccp-provider` exposes to the orchestrator.

mod config;
pub mod facade;
mod instances;
mod loadbalancer;
mod metadata;
mod registry;
mod volumes;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use ccp_provider::error::ProviderError;
use ccp_provider::traits::{CloudServices, LoadBalancingService};
use ccp_provider::types::{CloudConfig, Instance};
use tokio::sync::Mutex as AsyncMutex;

pub use facade::{RealCloudServices, TestDoubleServices};
pub use metadata::AwsMetadataResolver;
use registry::InstanceRegistry;

const CLUSTER_TAG_KEY: &str = "KubernetesCluster";
pub(crate) const VPC_NAME_TAG_VALUE: &str = "kubernetes-vpc";
/// Default admit-all source range used by `ensure_ingress` when creating
/// a load balancer's security group. spec.md §4.7 takes a source CIDR as
/// an input but never names a default; an open LB is the behavior the
/// classic in-tree AWS cloud provider falls back to absent a narrower
/// `LoadBalancerSourceRanges` annotation, so that's what's used here too
/// (an Open Question resolution, recorded in `DESIGN.md`).
pub(crate) const DEFAULT_SOURCE_CIDR: &str = "0.0.0.0/0";

/// The top-level object the orchestrator holds: composes the Config
/// Loader, Metadata Resolver, Cloud Services Facade, and Instance
/// Registry, and implements the public capability traits.
pub struct AwsCloudProvider {
    config: OnceLock<CloudConfig>,
    services: Arc<dyn CloudServices>,
    registry: InstanceRegistry,
    /// Provider-level region → LoadBalancing-client cache (spec.md §3
    /// "Ownership", §5 "Provider-level LB-client map"). An async mutex
    /// for the same reason `registry`'s device map uses one: the
    /// get-or-create has to call the (async) facade factory inside the
    /// critical section.
    lb_clients: AsyncMutex<HashMap<String, Arc<dyn LoadBalancingService>>>,
}

impl AwsCloudProvider {
    /// Loads configuration (falling back to the metadata service for a
    /// missing zone), resolves a missing `cluster_tag` from the "self"
    /// instance's tags, and returns a ready-to-use provider (spec.md
    /// §4.1, §2 "Data flow").
    pub async fn bootstrap(
        config_doc: &str,
        services: Arc<dyn CloudServices>,
    ) -> Result<Self, ProviderError> {
        let metadata = services.metadata();
        let mut loaded = config::load_config(config_doc, metadata.as_ref()).await?;
        let registry = InstanceRegistry::new();

        if loaded.cluster_tag.is_none() {
            let self_id = registry.self_instance_id(metadata.as_ref()).await?;
            let compute = services.compute(loaded.region()).await;
            let self_instance = compute
                .describe_instances(&[self_id], None)
                .await?
                .into_iter()
                .next();
            if let Some(instance) = self_instance {
                loaded.cluster_tag = instance.tags.get(CLUSTER_TAG_KEY).cloned();
            }
        }

        let config = OnceLock::new();
        config
            .set(loaded)
            .unwrap_or_else(|_| unreachable!("config is set exactly once, here"));

        Ok(AwsCloudProvider {
            config,
            services,
            registry,
            lb_clients: AsyncMutex::new(HashMap::new()),
        })
    }

    fn config(&self) -> &CloudConfig {
        self.config
            .get()
            .expect("AwsCloudProvider method called before bootstrap() completed")
    }

    fn region(&self) -> &str {
        self.config().region()
    }

    /// Get-or-create a region-scoped LoadBalancing client (spec.md §5
    /// "Provider-level LB-client map").
    async fn lb_client(&self, region: &str) -> Arc<dyn LoadBalancingService> {
        let mut clients = self.lb_clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        let client = self.services.load_balancing(region).await;
        clients.insert(region.to_string(), client.clone());
        client
    }

    /// Looks up the unique alive instance with the given private DNS
    /// name (spec.md §4.4 "Addresses"). `NotFound`/`Ambiguous` on zero or
    /// more than one match.
    async fn lookup_instance_by_name(&self, name: &str) -> Result<Instance, ProviderError> {
        let compute = self.services.compute(self.region()).await;
        let mut matches = compute.describe_instances(&[], Some(name)).await?;
        match matches.len() {
            0 => Err(ProviderError::NotFound(format!(
                "no alive instance with private DNS name {name:?}"
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(ProviderError::Ambiguous(format!(
                "multiple alive instances with private DNS name {name:?}"
            ))),
        }
    }

    /// Resolves the empty-string "self" shorthand via the Instance
    /// Registry, or looks up `name` otherwise, returning a cloud instance
    /// id (spec.md §4.5 "Volume Lifecycle").
    async fn resolve_instance_id(&self, name: &str) -> Result<String, ProviderError> {
        if name.is_empty() {
            self.registry
                .self_instance_id(self.services.metadata().as_ref())
                .await
        } else {
            Ok(self.lookup_instance_by_name(name).await?.instance_id)
        }
    }
}
