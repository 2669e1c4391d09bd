//! `Volumes` implementation: attach/detach with device-letter assignment,
//! and create/delete (`SPEC_FULL.md` §4.5).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ccp_provider::device;
use ccp_provider::error::ProviderError;
use ccp_provider::traits::{ComputeService, Volumes};
use ccp_provider::types::AttachmentState;
use ccp_provider::CanonicalVolumeName;

use crate::AwsCloudProvider;

const POLL_ATTEMPTS: usize = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls `describe_volume` at 1 Hz for up to `POLL_ATTEMPTS`, reading the
/// single attachment's state field (spec.md §4.5 step 4). A volume with
/// no attachments at all counts as having reached `Detached`.
async fn poll_attachment(
    compute: &dyn ComputeService,
    volume_id: &str,
    target: AttachmentState,
) -> Result<(), ProviderError> {
    for _ in 0..POLL_ATTEMPTS {
        let volume = compute.describe_volume(volume_id).await?;
        let reached = match volume.attachments.first() {
            Some(attachment) => attachment.state == target,
            None => target == AttachmentState::Detached,
        };
        if reached {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Err(ProviderError::Timeout(format!(
        "waiting for volume {volume_id} to reach {target}"
    )))
}

#[async_trait]
impl Volumes for AwsCloudProvider {
    async fn attach_disk(
        &self,
        volume_name: &str,
        instance_name: &str,
        read_only: bool,
    ) -> Result<String, ProviderError> {
        if read_only {
            return Err(ProviderError::ReadOnlyUnsupported);
        }
        let volume: CanonicalVolumeName = volume_name.parse()?;
        let instance_id = self.resolve_instance_id(instance_name).await?;
        let compute = self.services.compute(self.region()).await;

        let assignment = self
            .registry
            .assign_device(compute.as_ref(), &instance_id, &volume)
            .await?;

        let result = async {
            if !assignment.already_attached {
                compute
                    .attach_volume(volume.volume_id(), &instance_id, &assignment.device)
                    .await?;
            }
            poll_attachment(compute.as_ref(), volume.volume_id(), AttachmentState::Attached).await
        }
        .await;

        match result {
            Ok(()) => Ok(device::to_guest_device_name(&assignment.device)),
            Err(e) => {
                self.registry
                    .release_reservation(&instance_id, &assignment.device, volume.volume_id())
                    .await;
                Err(e)
            }
        }
    }

    async fn detach_disk(&self, volume_name: &str, instance_name: &str) -> Result<(), ProviderError> {
        let volume: CanonicalVolumeName = volume_name.parse()?;
        let instance_id = self.resolve_instance_id(instance_name).await?;
        let compute = self.services.compute(self.region()).await;

        let device = self
            .registry
            .device_for(compute.as_ref(), &instance_id, volume.volume_id())
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "volume {} is not attached to instance {instance_id}",
                    volume.volume_id()
                ))
            })?;

        compute
            .detach_volume(volume.volume_id(), &instance_id, &device)
            .await?;
        poll_attachment(compute.as_ref(), volume.volume_id(), AttachmentState::Detached).await?;
        self.registry
            .release_reservation(&instance_id, &device, volume.volume_id())
            .await;
        Ok(())
    }

    async fn create_volume(
        &self,
        capacity_mb: u64,
        tags: HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let size_gb = ((capacity_mb + 1023) / 1024) as i32;
        let zone = self.config().zone.clone();
        let compute = self.services.compute(self.region()).await;
        let volume_id = compute.create_volume(&zone, size_gb, &tags).await?;
        Ok(CanonicalVolumeName::new(zone, volume_id)?.to_string())
    }

    async fn delete_volume(&self, volume_name: &str) -> Result<(), ProviderError> {
        let volume: CanonicalVolumeName = volume_name.parse()?;
        let compute = self.services.compute(self.region()).await;
        compute.delete_volume(volume.volume_id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::test_double::TestDoubleServices;
    use ccp_provider::types::{Instance, InstanceState, Volume};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn instance(id: &str) -> Instance {
        Instance {
            instance_id: id.to_string(),
            private_dns_name: format!("{id}.internal"),
            private_ip: Ok(Ipv4Addr::new(10, 0, 0, 1)),
            public_ip: None,
            availability_zone: "us-east-1a".to_string(),
            instance_type: "m5.large".to_string(),
            state: InstanceState::Running,
            block_device_mappings: Vec::new(),
            tags: Default::default(),
        }
    }

    async fn provider_with(services: TestDoubleServices) -> AwsCloudProvider {
        AwsCloudProvider::bootstrap(
            "[Global]\nZone = us-east-1a\nKubernetesClusterTag = test\n",
            Arc::new(services),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn first_attach_uses_sdf_and_translates_device_name() {
        let services = TestDoubleServices::new();
        services.add_instance(instance("i-1"));
        services.add_volume(Volume {
            volume_id: "vol-aaa".to_string(),
            availability_zone: "us-east-1a".to_string(),
            attachments: Vec::new(),
        });
        let services_for_provider = services.clone();
        let provider = provider_with(services_for_provider).await;

        let device = provider
            .attach_disk("aws://us-east-1a/vol-aaa", "i-1.internal", false)
            .await
            .unwrap();
        assert_eq!(device, "/dev/xvdf");
        assert_eq!(services.attach_volume_call_count(), 1);
    }

    #[tokio::test]
    async fn read_only_is_rejected_before_any_remote_call() {
        let services = TestDoubleServices::new();
        services.add_instance(instance("i-1"));
        let services_for_provider = services.clone();
        let provider = provider_with(services_for_provider).await;

        let result = provider
            .attach_disk("aws://us-east-1a/vol-aaa", "i-1.internal", true)
            .await;
        assert!(matches!(result, Err(ProviderError::ReadOnlyUnsupported)));
        assert_eq!(services.attach_volume_call_count(), 0);
    }

    #[tokio::test]
    async fn device_exhaustion_leaves_cache_unchanged() {
        let services = TestDoubleServices::new();
        let mut all_devices_used = instance("i-1");
        all_devices_used.block_device_mappings = device::DEVICE_NAMES
            .iter()
            .enumerate()
            .map(|(i, d)| ccp_provider::types::BlockDeviceMapping {
                device_name: d.to_string(),
                volume_id: format!("vol-{i}"),
            })
            .collect();
        services.add_instance(all_devices_used);
        services.add_volume(Volume {
            volume_id: "vol-new".to_string(),
            availability_zone: "us-east-1a".to_string(),
            attachments: Vec::new(),
        });
        let services_for_provider = services.clone();
        let provider = provider_with(services_for_provider).await;

        let result = provider
            .attach_disk("aws://us-east-1a/vol-new", "i-1.internal", false)
            .await;
        assert!(matches!(result, Err(ProviderError::NoDeviceAvailable)));
        assert_eq!(services.attach_volume_call_count(), 0);
    }

    #[tokio::test]
    async fn create_volume_rounds_capacity_up_to_whole_gb() {
        let services = TestDoubleServices::new();
        let services_for_provider = services.clone();
        let provider = provider_with(services_for_provider).await;

        let name = provider
            .create_volume(1025, HashMap::new())
            .await
            .unwrap();
        let parsed: CanonicalVolumeName = name.parse().unwrap();
        assert_eq!(parsed.availability_zone(), "us-east-1a");
    }
}
