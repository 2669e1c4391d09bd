//! The vendor-SDK-backed `CloudServices` implementation. This is the only
//! module in the workspace that names `aws_sdk_ec2`/`aws_sdk_elasticloadbalancing`
//! types directly (`SPEC_FULL.md` §9 "Interface polymorphism").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_ec2::model::{
    Filter, IpPermission, IpRange, ResourceType, Tag, TagSpecification, VolumeAttachmentState,
};
use aws_sdk_elasticloadbalancing::model::{
    Instance as ElbInstance, Listener as ElbListener,
};
use ccp_aws_util::collect_paginated;
use ccp_provider::error::ProviderError;
use ccp_provider::traits::{ComputeService, LoadBalancingService, MetadataResolver};
use ccp_provider::types::{
    AttachmentState, BlockDeviceMapping, Instance, InstanceState, IngressPermission,
    LoadBalancerDescription, LoadBalancerSpec, SecurityGroup, Subnet, Volume, VolumeAttachment,
    Vpc,
};
use tokio::sync::Mutex as AsyncMutex;

use crate::CloudServices;

/// Lazily builds and caches a region-scoped client per remote service.
/// Construction is async (it resolves credentials over the network), so
/// the cache itself has to be an async mutex rather than the
/// `std::sync::Mutex` the rest of the crate uses — see `registry.rs` for
/// the same tradeoff on the device-map cache.
pub struct RealCloudServices {
    metadata: Arc<dyn MetadataResolver>,
    compute: AsyncMutex<HashMap<String, Arc<dyn ComputeService>>>,
    load_balancing: AsyncMutex<HashMap<String, Arc<dyn LoadBalancingService>>>,
}

impl RealCloudServices {
    pub fn new(metadata: Arc<dyn MetadataResolver>) -> Self {
        RealCloudServices {
            metadata,
            compute: AsyncMutex::new(HashMap::new()),
            load_balancing: AsyncMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CloudServices for RealCloudServices {
    async fn compute(&self, region: &str) -> Arc<dyn ComputeService> {
        let mut clients = self.compute.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        let client: Arc<dyn ComputeService> = Arc::new(RealComputeService {
            client: ccp_aws_util::ec2_client(region).await,
        });
        clients.insert(region.to_string(), client.clone());
        client
    }

    async fn load_balancing(&self, region: &str) -> Arc<dyn LoadBalancingService> {
        let mut clients = self.load_balancing.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        let client: Arc<dyn LoadBalancingService> = Arc::new(RealLoadBalancingService {
            client: ccp_aws_util::elb_client(region).await,
        });
        clients.insert(region.to_string(), client.clone());
        client
    }

    fn metadata(&self) -> Arc<dyn MetadataResolver> {
        self.metadata.clone()
    }
}

struct RealComputeService {
    client: aws_sdk_ec2::Client,
}

/// Decodes the low byte of an EC2 instance state code. Unrecognized codes
/// are logged and treated as dead, per the error-handling policy in
/// `SPEC_FULL.md` §7 ("unknown lifecycle states ... treated as
/// dead/absent").
fn instance_state_from_code(instance_id: &str, code: i32) -> Option<InstanceState> {
    let state = match code & 0xff {
        0 => InstanceState::Pending,
        16 => InstanceState::Running,
        32 => InstanceState::ShuttingDown,
        48 => InstanceState::Terminated,
        64 => InstanceState::Stopping,
        80 => InstanceState::Stopped,
        other => {
            tracing::warn!(instance_id, code = other, "unrecognized EC2 instance state code");
            return None;
        }
    };
    Some(state)
}

/// Converts a raw SDK instance into our domain type, returning `None` for
/// anything the facade treats as absent: a dead state, or a missing
/// required field. A private IP that is *present but unparseable* is not
/// treated as absent — the instance is kept with `private_ip: Err(raw)` so
/// that callers needing the address (`node_addresses`) can surface
/// `DataInvalid` per spec.md §4.4, rather than the instance silently
/// vanishing from every capability operation.
fn convert_instance(raw: aws_sdk_ec2::model::Instance) -> Option<Instance> {
    let instance_id = raw.instance_id?;
    let code = raw.state.as_ref().and_then(|s| s.code).unwrap_or(-1);
    let state = instance_state_from_code(&instance_id, code)?;
    if !state.is_alive() {
        return None;
    }
    let private_ip = match raw.private_ip_address.as_deref() {
        Some(s) => s.parse::<std::net::Ipv4Addr>().map_err(|_| s.to_string()),
        None => {
            tracing::warn!(instance_id, "instance is missing a private ip; treating as absent");
            return None;
        }
    };
    let public_ip = raw.public_ip_address.as_deref().and_then(|s| s.parse().ok());
    let availability_zone = raw
        .placement
        .and_then(|p| p.availability_zone)
        .unwrap_or_default();
    let instance_type = raw
        .instance_type
        .map(|t| t.as_str().to_string())
        .unwrap_or_default();
    let block_device_mappings = raw
        .block_device_mappings
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            Some(BlockDeviceMapping {
                device_name: m.device_name?,
                volume_id: m.ebs?.volume_id?,
            })
        })
        .collect();
    let tags = raw
        .tags
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| Some((t.key?, t.value?)))
        .collect();
    Some(Instance {
        instance_id,
        private_dns_name: raw.private_dns_name.unwrap_or_default(),
        private_ip,
        public_ip,
        availability_zone,
        instance_type,
        state,
        block_device_mappings,
        tags,
    })
}

fn convert_security_group(raw: aws_sdk_ec2::model::SecurityGroup) -> Option<SecurityGroup> {
    let group_id = raw.group_id?;
    let vpc_id = raw.vpc_id.unwrap_or_default();
    let name = raw.group_name.unwrap_or_default();
    let permissions = raw
        .ip_permissions
        .unwrap_or_default()
        .into_iter()
        .flat_map(|perm| {
            let protocol = perm.ip_protocol.unwrap_or_default();
            let from_port = perm.from_port.unwrap_or_default().max(0) as u16;
            let to_port = perm.to_port.unwrap_or_default().max(0) as u16;
            perm.ip_ranges
                .unwrap_or_default()
                .into_iter()
                .filter_map(move |range| {
                    Some(IngressPermission {
                        protocol: protocol.clone(),
                        from_port,
                        to_port,
                        cidr: range.cidr_ip?,
                    })
                })
        })
        .collect();
    Some(SecurityGroup {
        group_id,
        vpc_id,
        name,
        permissions,
    })
}

#[async_trait]
impl ComputeService for RealComputeService {
    async fn describe_instances(
        &self,
        instance_ids: &[String],
        private_dns_name_filter: Option<&str>,
    ) -> Result<Vec<Instance>, ProviderError> {
        let mut request = self.client.describe_instances();
        if !instance_ids.is_empty() {
            request = request.set_instance_ids(Some(instance_ids.to_vec()));
        }
        if let Some(dns_name) = private_dns_name_filter {
            request = request.filters(
                Filter::builder()
                    .name("private-dns-name")
                    .values(dns_name)
                    .build(),
            );
        }
        let pages = collect_paginated(request.into_paginator().send())
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DescribeInstances: {e}")))?;
        let mut instances = Vec::new();
        for page in pages {
            for reservation in page.reservations.unwrap_or_default() {
                instances.extend(
                    reservation
                        .instances
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(convert_instance),
                );
            }
        }
        Ok(instances)
    }

    async fn attach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .attach_volume()
            .volume_id(volume_id)
            .instance_id(instance_id)
            .device(device)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("AttachVolume: {e}")))?;
        Ok(())
    }

    async fn detach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError> {
        let output = self
            .client
            .detach_volume()
            .volume_id(volume_id)
            .instance_id(instance_id)
            .device(device)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DetachVolume: {e}")))?;
        output
            .volume_id
            .ok_or_else(|| ProviderError::ProtocolError("DetachVolume response missing volume id".into()))?;
        output
            .state
            .ok_or_else(|| ProviderError::ProtocolError("DetachVolume response missing attachment state".into()))?;
        Ok(())
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume, ProviderError> {
        let output = self
            .client
            .describe_volumes()
            .volume_ids(volume_id)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DescribeVolumes: {e}")))?;
        let raw = output
            .volumes
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("volume {volume_id}")))?;
        let attachments = raw
            .attachments
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                let state = match a.state? {
                    VolumeAttachmentState::Attaching => AttachmentState::Attaching,
                    VolumeAttachmentState::Attached => AttachmentState::Attached,
                    VolumeAttachmentState::Detaching => AttachmentState::Detaching,
                    VolumeAttachmentState::Detached => AttachmentState::Detached,
                    other => {
                        tracing::warn!(?other, "unrecognized volume attachment state");
                        return None;
                    }
                };
                Some(VolumeAttachment {
                    instance_id: a.instance_id?,
                    device: a.device?,
                    state,
                })
            })
            .collect();
        Ok(Volume {
            volume_id: raw.volume_id.unwrap_or_else(|| volume_id.to_string()),
            availability_zone: raw.availability_zone.unwrap_or_default(),
            attachments,
        })
    }

    async fn create_volume(
        &self,
        availability_zone: &str,
        size_gb: i32,
        tags: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let tag_specifications = if tags.is_empty() {
            None
        } else {
            Some(vec![TagSpecification::builder()
                .resource_type(ResourceType::Volume)
                .set_tags(Some(
                    tags.iter()
                        .map(|(k, v)| Tag::builder().key(k).value(v).build())
                        .collect(),
                ))
                .build()])
        };
        let output = self
            .client
            .create_volume()
            .availability_zone(availability_zone)
            .size(size_gb)
            .set_tag_specifications(tag_specifications)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("CreateVolume: {e}")))?;
        output
            .volume_id
            .ok_or_else(|| ProviderError::ProtocolError("CreateVolume response missing volume id".into()))
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_volume()
            .volume_id(volume_id)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DeleteVolume: {e}")))?;
        Ok(())
    }

    async fn describe_security_group_by_name(
        &self,
        vpc_id: &str,
        name: &str,
    ) -> Result<Vec<SecurityGroup>, ProviderError> {
        let output = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .filters(Filter::builder().name("group-name").values(name).build())
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DescribeSecurityGroups: {e}")))?;
        Ok(output
            .security_groups
            .unwrap_or_default()
            .into_iter()
            .filter_map(convert_security_group)
            .collect())
    }

    async fn describe_security_group_by_id(
        &self,
        group_id: &str,
    ) -> Result<Vec<SecurityGroup>, ProviderError> {
        let output = self
            .client
            .describe_security_groups()
            .group_ids(group_id)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DescribeSecurityGroups: {e}")))?;
        Ok(output
            .security_groups
            .unwrap_or_default()
            .into_iter()
            .filter_map(convert_security_group)
            .collect())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> Result<SecurityGroup, ProviderError> {
        let output = self
            .client
            .create_security_group()
            .vpc_id(vpc_id)
            .group_name(name)
            .description(description)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("CreateSecurityGroup: {e}")))?;
        let group_id = output.group_id.ok_or_else(|| {
            ProviderError::ProtocolError("CreateSecurityGroup response missing group id".into())
        })?;
        Ok(SecurityGroup {
            group_id,
            vpc_id: vpc_id.to_string(),
            name: name.to_string(),
            permissions: Vec::new(),
        })
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: &[IngressPermission],
    ) -> Result<(), ProviderError> {
        let ip_permissions: Vec<IpPermission> = permissions
            .iter()
            .map(|p| {
                IpPermission::builder()
                    .ip_protocol(&p.protocol)
                    .from_port(p.from_port as i32)
                    .to_port(p.to_port as i32)
                    .ip_ranges(IpRange::builder().cidr_ip(&p.cidr).build())
                    .build()
            })
            .collect();
        self.client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(ip_permissions))
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("AuthorizeSecurityGroupIngress: {e}")))?;
        Ok(())
    }

    async fn describe_vpcs_by_tag(&self, key: &str, value: &str) -> Result<Vec<Vpc>, ProviderError> {
        let output = self
            .client
            .describe_vpcs()
            .filters(Filter::builder().name(format!("tag:{key}")).values(value).build())
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DescribeVpcs: {e}")))?;
        Ok(output
            .vpcs
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| {
                Some(Vpc {
                    vpc_id: v.vpc_id?,
                    tags: v
                        .tags
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|t| Some((t.key?, t.value?)))
                        .collect(),
                })
            })
            .collect())
    }

    async fn describe_subnets(&self, vpc_id: &str) -> Result<Vec<Subnet>, ProviderError> {
        let output = self
            .client
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DescribeSubnets: {e}")))?;
        Ok(output
            .subnets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| {
                Some(Subnet {
                    subnet_id: s.subnet_id?,
                    vpc_id: s.vpc_id?,
                    availability_zone: s.availability_zone?,
                })
            })
            .collect())
    }
}

struct RealLoadBalancingService {
    client: aws_sdk_elasticloadbalancing::Client,
}

/// The classic ELB API reports a missing load balancer as a named fault
/// rather than an empty list; this is the single place that fold
/// translates that into "absent" (spec.md §7 propagation policy (a)).
fn is_load_balancer_not_found<E>(err: &aws_sdk_elasticloadbalancing::error::SdkError<E>) -> bool
where
    E: std::fmt::Debug,
{
    matches!(
        err,
        aws_sdk_elasticloadbalancing::error::SdkError::ServiceError(ctx)
            if format!("{:?}", ctx.err()).contains("LoadBalancerNotFound")
    )
}

#[async_trait]
impl LoadBalancingService for RealLoadBalancingService {
    async fn describe(&self, name: &str) -> Result<Option<LoadBalancerDescription>, ProviderError> {
        match self
            .client
            .describe_load_balancers()
            .load_balancer_names(name)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .load_balancer_descriptions
                .unwrap_or_default()
                .into_iter()
                .next()
                .map(|lb| LoadBalancerDescription {
                    name: lb.load_balancer_name.unwrap_or_default(),
                    dns_name: lb.dns_name.unwrap_or_default(),
                    instance_ids: lb
                        .instances
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|i| i.instance_id)
                        .collect(),
                    security_group_id: lb.security_groups.unwrap_or_default().into_iter().next(),
                    subnets: lb.subnets.unwrap_or_default(),
                })),
            Err(e) if is_load_balancer_not_found(&e) => Ok(None),
            Err(e) => Err(ProviderError::CloudApiError(format!(
                "DescribeLoadBalancers: {e}"
            ))),
        }
    }

    async fn create(&self, spec: &LoadBalancerSpec) -> Result<LoadBalancerDescription, ProviderError> {
        let listeners: Vec<ElbListener> = spec
            .listeners
            .iter()
            .map(|l| {
                ElbListener::builder()
                    .protocol(&l.protocol)
                    .load_balancer_port(l.load_balancer_port as i32)
                    .instance_protocol(&l.protocol)
                    .instance_port(l.instance_port as i32)
                    .build()
            })
            .collect();
        let output = self
            .client
            .create_load_balancer()
            .load_balancer_name(&spec.name)
            .set_listeners(Some(listeners))
            .set_subnets(Some(spec.subnets.clone()))
            .set_security_groups(Some(spec.security_groups.clone()))
            .scheme("internet-facing")
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("CreateLoadBalancer: {e}")))?;
        let dns_name = output.dns_name.ok_or_else(|| {
            ProviderError::ProtocolError("CreateLoadBalancer response missing dns name".into())
        })?;
        Ok(LoadBalancerDescription {
            name: spec.name.clone(),
            dns_name,
            instance_ids: Vec::new(),
            security_group_id: spec.security_groups.first().cloned(),
            subnets: spec.subnets.clone(),
        })
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_load_balancer()
            .load_balancer_name(name)
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("DeleteLoadBalancer: {e}")))?;
        Ok(())
    }

    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<(), ProviderError> {
        let instances: Vec<ElbInstance> = instance_ids
            .iter()
            .map(|id| ElbInstance::builder().instance_id(id).build())
            .collect();
        self.client
            .register_instances_with_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(instances))
            .send()
            .await
            .map_err(|e| ProviderError::CloudApiError(format!("RegisterInstancesWithLoadBalancer: {e}")))?;
        Ok(())
    }

    async fn deregister_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<(), ProviderError> {
        let instances: Vec<ElbInstance> = instance_ids
            .iter()
            .map(|id| ElbInstance::builder().instance_id(id).build())
            .collect();
        self.client
            .deregister_instances_from_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(instances))
            .send()
            .await
            .map_err(|e| {
                ProviderError::CloudApiError(format!("DeregisterInstancesFromLoadBalancer: {e}"))
            })?;
        Ok(())
    }
}
