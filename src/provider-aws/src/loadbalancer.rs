//! `TcpLoadBalancer` implementation: idempotent create/adopt, update,
//! delete, and the `ensure_ingress` security-group reconciliation helper
//! (`SPEC_FULL.md` §4.6, §4.7).

use async_trait::async_trait;
use ccp_provider::error::ProviderError;
use ccp_provider::traits::{ComputeService, TcpLoadBalancer};
use ccp_provider::types::{
    Instance, IngressPermission, Listener, LoadBalancerSpec, LoadBalancerStatus, ServiceAffinity,
    ServicePort,
};

use crate::{AwsCloudProvider, DEFAULT_SOURCE_CIDR, VPC_NAME_TAG_VALUE};

fn security_group_name(lb_name: &str) -> String {
    format!("k8s-elb-{lb_name}")
}

/// Ensures the security group admits every desired `(protocol, port)`
/// over `source_cidr`, issuing at most one `AuthorizeIngress` call
/// (spec.md §4.7).
async fn ensure_ingress(
    compute: &dyn ComputeService,
    group_id: &str,
    source_cidr: &str,
    ports: &[(String, u16)],
) -> Result<bool, ProviderError> {
    let mut groups = compute.describe_security_group_by_id(group_id).await?;
    if groups.len() != 1 {
        return Err(ProviderError::Ambiguous(format!(
            "expected exactly one security group for id {group_id}, found {}",
            groups.len()
        )));
    }
    let group = groups.remove(0);

    let missing: Vec<IngressPermission> = ports
        .iter()
        .map(|(protocol, port)| IngressPermission {
            protocol: protocol.clone(),
            from_port: *port,
            to_port: *port,
            cidr: source_cidr.to_string(),
        })
        .filter(|wanted| !group.permissions.contains(wanted))
        .collect();

    let changed = !missing.is_empty();
    if changed {
        compute.authorize_ingress(group_id, &missing).await?;
    }
    Ok(changed)
}

/// Resolves `hosts` into instance objects, failing if any host is not a
/// known alive instance (spec.md §4.6 step 2).
async fn resolve_hosts(
    provider: &AwsCloudProvider,
    hosts: &[String],
) -> Result<Vec<Instance>, ProviderError> {
    let mut instances = Vec::with_capacity(hosts.len());
    for host in hosts {
        instances.push(provider.lookup_instance_by_name(host).await?);
    }
    Ok(instances)
}

/// Builds the listener set from the requested service ports, skipping
/// ports whose node port has not yet been assigned (spec.md §4.6 step
/// 6).
fn build_listeners(ports: &[ServicePort]) -> Vec<Listener> {
    ports
        .iter()
        .filter_map(|port| {
            if port.node_port == 0 {
                tracing::warn!(
                    load_balancer_port = port.port,
                    "service port has no assigned node port yet; skipping listener"
                );
                return None;
            }
            let protocol = port.protocol.as_lower_str().to_string();
            Some(Listener {
                load_balancer_port: port.port,
                instance_port: port.node_port,
                protocol,
            })
        })
        .collect()
}

#[async_trait]
impl TcpLoadBalancer for AwsCloudProvider {
    async fn ensure_tcp_load_balancer(
        &self,
        name: &str,
        region: &str,
        hosts: &[String],
        ports: &[ServicePort],
        affinity: ServiceAffinity,
        public_ip: Option<std::net::Ipv4Addr>,
    ) -> Result<LoadBalancerStatus, ProviderError> {
        if !matches!(affinity, ServiceAffinity::None) {
            return Err(ProviderError::UnsupportedAffinity(format!("{affinity:?}")));
        }
        if public_ip.is_some() {
            return Err(ProviderError::PublicIpNotSupported);
        }

        let instances = resolve_hosts(self, hosts).await?;
        let instance_ids: Vec<String> = instances.iter().map(|i| i.instance_id.clone()).collect();

        let compute = self.services.compute(region).await;
        let lb_client = self.lb_client(region).await;

        let mut vpcs = compute
            .describe_vpcs_by_tag("Name", VPC_NAME_TAG_VALUE)
            .await?;
        if vpcs.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no VPC tagged Name={VPC_NAME_TAG_VALUE}"
            )));
        }
        if vpcs.len() > 1 {
            return Err(ProviderError::Ambiguous(format!(
                "multiple VPCs tagged Name={VPC_NAME_TAG_VALUE}"
            )));
        }
        let vpc = vpcs.remove(0);

        let subnets = compute.describe_subnets(&vpc.vpc_id).await?;
        for subnet in &subnets {
            if !subnet.availability_zone.starts_with(region) {
                return Err(ProviderError::ConfigInvalid(format!(
                    "subnet {} is in AZ {} which is outside region {region}",
                    subnet.subnet_id, subnet.availability_zone
                )));
            }
        }
        let subnet_ids: Vec<String> = subnets.into_iter().map(|s| s.subnet_id).collect();

        if let Some(existing) = lb_client.describe(name).await? {
            // Adopt: reuse the existing DNS name/id without reconfiguring
            // listeners. TODO: verify the adopted LB's listeners/subnets/
            // security groups still match the desired spec (spec.md §9).
            if let Err(e) = lb_client.register_instances(name, &instance_ids).await {
                tracing::warn!(load_balancer = name, error = %e, "failed to register instances with adopted load balancer; will be reconciled on update");
            }
            return Ok(LoadBalancerStatus::single_hostname(existing.dns_name));
        }

        let listeners = build_listeners(ports);

        let group_name = security_group_name(name);
        let mut groups = compute
            .describe_security_group_by_name(&vpc.vpc_id, &group_name)
            .await?;
        let group = if groups.is_empty() {
            compute
                .create_security_group(
                    &vpc.vpc_id,
                    &group_name,
                    &format!("load balancer security group for {name}"),
                )
                .await?
        } else if groups.len() == 1 {
            groups.remove(0)
        } else {
            return Err(ProviderError::Ambiguous(format!(
                "multiple security groups named {group_name} in VPC {}",
                vpc.vpc_id
            )));
        };

        let desired_ports: Vec<(String, u16)> = listeners
            .iter()
            .map(|l| (l.protocol.clone(), l.load_balancer_port))
            .collect();
        ensure_ingress(compute.as_ref(), &group.group_id, DEFAULT_SOURCE_CIDR, &desired_ports).await?;

        let spec = LoadBalancerSpec {
            name: name.to_string(),
            listeners,
            subnets: subnet_ids,
            security_groups: vec![group.group_id],
        };
        let created = lb_client.create(&spec).await?;

        if let Err(e) = lb_client.register_instances(name, &instance_ids).await {
            tracing::warn!(load_balancer = name, error = %e, "failed to register instances with new load balancer; will be reconciled on update");
        }

        Ok(LoadBalancerStatus::single_hostname(created.dns_name))
    }

    async fn update_tcp_load_balancer(
        &self,
        name: &str,
        region: &str,
        hosts: &[String],
    ) -> Result<(), ProviderError> {
        let instances = resolve_hosts(self, hosts).await?;
        let desired: Vec<String> = instances.into_iter().map(|i| i.instance_id).collect();

        let lb_client = self.lb_client(region).await;
        let existing = lb_client
            .describe(name)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("load balancer {name}")))?;

        let to_add: Vec<String> = desired
            .iter()
            .filter(|id| !existing.instance_ids.contains(id))
            .cloned()
            .collect();
        let to_remove: Vec<String> = existing
            .instance_ids
            .iter()
            .filter(|id| !desired.contains(id))
            .cloned()
            .collect();

        if !to_add.is_empty() {
            lb_client.register_instances(name, &to_add).await?;
        }
        if !to_remove.is_empty() {
            lb_client.deregister_instances(name, &to_remove).await?;
        }
        Ok(())
    }

    async fn delete_tcp_load_balancer(&self, name: &str, region: &str) -> Result<(), ProviderError> {
        let lb_client = self.lb_client(region).await;
        if lb_client.describe(name).await?.is_none() {
            return Ok(());
        }
        // Security group deletion is intentionally deferred (spec.md §9
        // known gap: "Security group left behind on LB deletion").
        lb_client.delete(name).await
    }

    async fn tcp_load_balancer_exists(&self, name: &str, region: &str) -> Result<bool, ProviderError> {
        let lb_client = self.lb_client(region).await;
        Ok(lb_client.describe(name).await?.is_some())
    }

    async fn get_tcp_load_balancer(
        &self,
        name: &str,
        region: &str,
    ) -> Result<Option<LoadBalancerStatus>, ProviderError> {
        let lb_client = self.lb_client(region).await;
        Ok(lb_client
            .describe(name)
            .await?
            .map(|lb| LoadBalancerStatus::single_hostname(lb.dns_name)))
    }
}
