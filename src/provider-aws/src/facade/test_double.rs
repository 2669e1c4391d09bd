//! An in-memory `CloudServices` stand-in used by this crate's own test
//! suite (`SPEC_FULL.md` §9 "Interface polymorphism"; spec.md §8). Not
//! behind a feature flag: the teacher keeps its comparable in-memory
//! orchestrator test doubles in ordinary (non-`cfg(test)`) modules too,
//! since other crates' tests may want to construct one directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ccp_provider::error::ProviderError;
use ccp_provider::traits::{CloudServices, ComputeService, LoadBalancingService, MetadataResolver};
use ccp_provider::types::{
    AttachmentState, Instance, IngressPermission, LoadBalancerDescription, LoadBalancerSpec,
    SecurityGroup, Subnet, Volume, VolumeAttachment, Vpc,
};

#[derive(Default)]
struct State {
    instances: HashMap<String, Instance>,
    volumes: HashMap<String, Volume>,
    security_groups: HashMap<String, SecurityGroup>,
    vpcs: Vec<Vpc>,
    subnets: HashMap<String, Vec<Subnet>>,
    load_balancers: HashMap<String, LoadBalancerDescription>,
    metadata: HashMap<String, String>,
    attach_volume_calls: usize,
    create_load_balancer_calls: usize,
    next_id: usize,
}

/// A handle shared by every `ComputeService`/`LoadBalancingService`/
/// `MetadataResolver` this facade hands out, plus the seeding and
/// assertion methods the test suite uses directly.
#[derive(Clone)]
pub struct TestDoubleServices {
    state: Arc<Mutex<State>>,
}

impl Default for TestDoubleServices {
    fn default() -> Self {
        TestDoubleServices {
            state: Arc::new(Mutex::new(State::default())),
        }
    }
}

impl TestDoubleServices {
    pub fn new() -> Self {
        TestDoubleServices::default()
    }

    pub fn add_instance(&self, instance: Instance) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.instances.insert(instance.instance_id.clone(), instance);
    }

    pub fn add_volume(&self, volume: Volume) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.volumes.insert(volume.volume_id.clone(), volume);
    }

    pub fn add_vpc(&self, vpc: Vpc) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.vpcs.push(vpc);
    }

    pub fn add_subnet(&self, subnet: Subnet) {
        let mut state = self.state.lock().expect("lock poisoned");
        state
            .subnets
            .entry(subnet.vpc_id.clone())
            .or_default()
            .push(subnet);
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.metadata.insert(key.into(), value.into());
    }

    pub fn seed_load_balancer(&self, lb: LoadBalancerDescription) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.load_balancers.insert(lb.name.clone(), lb);
    }

    pub fn load_balancer(&self, name: &str) -> Option<LoadBalancerDescription> {
        let state = self.state.lock().expect("lock poisoned");
        state.load_balancers.get(name).cloned()
    }

    pub fn security_group(&self, group_id: &str) -> Option<SecurityGroup> {
        let state = self.state.lock().expect("lock poisoned");
        state.security_groups.get(group_id).cloned()
    }

    pub fn attach_volume_call_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").attach_volume_calls
    }

    pub fn create_load_balancer_call_count(&self) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .create_load_balancer_calls
    }
}

#[async_trait]
impl CloudServices for TestDoubleServices {
    async fn compute(&self, _region: &str) -> Arc<dyn ComputeService> {
        Arc::new(TestDoubleCompute {
            state: self.state.clone(),
        })
    }

    async fn load_balancing(&self, _region: &str) -> Arc<dyn LoadBalancingService> {
        Arc::new(TestDoubleLoadBalancing {
            state: self.state.clone(),
        })
    }

    fn metadata(&self) -> Arc<dyn MetadataResolver> {
        Arc::new(TestDoubleMetadata {
            state: self.state.clone(),
        })
    }
}

struct TestDoubleCompute {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl ComputeService for TestDoubleCompute {
    async fn describe_instances(
        &self,
        instance_ids: &[String],
        private_dns_name_filter: Option<&str>,
    ) -> Result<Vec<Instance>, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        let matches = state.instances.values().filter(|i| {
            if !i.state.is_alive() {
                return false;
            }
            if !instance_ids.is_empty() {
                return instance_ids.iter().any(|id| id == &i.instance_id);
            }
            if let Some(dns) = private_dns_name_filter {
                return i.private_dns_name == dns;
            }
            true
        });
        Ok(matches.cloned().collect())
    }

    async fn attach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.attach_volume_calls += 1;
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| ProviderError::NotFound(format!("volume {volume_id}")))?;
        volume.attachments = vec![VolumeAttachment {
            instance_id: instance_id.to_string(),
            device: device.to_string(),
            state: AttachmentState::Attached,
        }];
        Ok(())
    }

    async fn detach_volume(
        &self,
        volume_id: &str,
        _instance_id: &str,
        _device: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| ProviderError::NotFound(format!("volume {volume_id}")))?;
        volume.attachments.clear();
        Ok(())
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        state
            .volumes
            .get(volume_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("volume {volume_id}")))
    }

    async fn create_volume(
        &self,
        availability_zone: &str,
        _size_gb: i32,
        _tags: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.next_id += 1;
        let volume_id = format!("vol-test{:06}", state.next_id);
        state.volumes.insert(
            volume_id.clone(),
            Volume {
                volume_id: volume_id.clone(),
                availability_zone: availability_zone.to_string(),
                attachments: Vec::new(),
            },
        );
        Ok(volume_id)
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.volumes.remove(volume_id);
        Ok(())
    }

    async fn describe_security_group_by_name(
        &self,
        vpc_id: &str,
        name: &str,
    ) -> Result<Vec<SecurityGroup>, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state
            .security_groups
            .values()
            .filter(|g| g.vpc_id == vpc_id && g.name == name)
            .cloned()
            .collect())
    }

    async fn describe_security_group_by_id(
        &self,
        group_id: &str,
    ) -> Result<Vec<SecurityGroup>, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state.security_groups.get(group_id).cloned().into_iter().collect())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        _description: &str,
    ) -> Result<SecurityGroup, ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.next_id += 1;
        let group_id = format!("sg-test{:06}", state.next_id);
        let group = SecurityGroup {
            group_id: group_id.clone(),
            vpc_id: vpc_id.to_string(),
            name: name.to_string(),
            permissions: Vec::new(),
        };
        state.security_groups.insert(group_id, group.clone());
        Ok(group)
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: &[IngressPermission],
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let group = state
            .security_groups
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::NotFound(format!("security group {group_id}")))?;
        for permission in permissions {
            if !group.permissions.contains(permission) {
                group.permissions.push(permission.clone());
            }
        }
        Ok(())
    }

    async fn describe_vpcs_by_tag(&self, key: &str, value: &str) -> Result<Vec<Vpc>, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state
            .vpcs
            .iter()
            .filter(|v| v.tags.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn describe_subnets(&self, vpc_id: &str) -> Result<Vec<Subnet>, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state.subnets.get(vpc_id).cloned().unwrap_or_default())
    }
}

struct TestDoubleLoadBalancing {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl LoadBalancingService for TestDoubleLoadBalancing {
    async fn describe(&self, name: &str) -> Result<Option<LoadBalancerDescription>, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state.load_balancers.get(name).cloned())
    }

    async fn create(&self, spec: &LoadBalancerSpec) -> Result<LoadBalancerDescription, ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.create_load_balancer_calls += 1;
        let description = LoadBalancerDescription {
            name: spec.name.clone(),
            dns_name: format!("{}.elb.test", spec.name),
            instance_ids: Vec::new(),
            security_group_id: spec.security_groups.first().cloned(),
            subnets: spec.subnets.clone(),
        };
        state
            .load_balancers
            .insert(spec.name.clone(), description.clone());
        Ok(description)
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.load_balancers.remove(name);
        Ok(())
    }

    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let lb = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(format!("load balancer {name}")))?;
        for id in instance_ids {
            if !lb.instance_ids.contains(id) {
                lb.instance_ids.push(id.clone());
            }
        }
        Ok(())
    }

    async fn deregister_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let lb = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(format!("load balancer {name}")))?;
        lb.instance_ids.retain(|id| !instance_ids.contains(id));
        Ok(())
    }
}

struct TestDoubleMetadata {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl MetadataResolver for TestDoubleMetadata {
    async fn get(&self, key: &str) -> Result<String, ProviderError> {
        let state = self.state.lock().expect("lock poisoned");
        state
            .metadata
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::MetadataUnavailable(format!("no stubbed value for {key}")))
    }
}
