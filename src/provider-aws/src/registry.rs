//! Instance Registry: the per-instance device-mapping cache and the
//! lazily-resolved "self" instance id (`SPEC_FULL.md` §2 component 4, §5,
//! §9 "Lazy caches").
//!
//! Device-map population requires a remote `describe_instances` call, so
//! its mutex has to be held across an `.await` — this uses
//! `tokio::sync::Mutex` rather than the plain `std::sync::Mutex` the rest
//! of the crate favors, specifically so the "populate exactly once" step
//! in spec.md §4.5 step 1 can run inside the same critical section that
//! picks and reserves a device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ccp_provider::error::ProviderError;
use ccp_provider::traits::ComputeService;
use ccp_provider::{device, CanonicalVolumeName};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

#[derive(Default)]
struct DeviceMap {
    populated: bool,
    mapping: HashMap<String, String>,
}

/// Outcome of the device-assignment algorithm (spec.md §4.5).
pub struct DeviceAssignment {
    pub device: String,
    pub already_attached: bool,
}

pub struct InstanceRegistry {
    self_instance_id: OnceCell<String>,
    entries: Mutex<HashMap<String, Arc<AsyncMutex<DeviceMap>>>>,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        InstanceRegistry {
            self_instance_id: OnceCell::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        InstanceRegistry::default()
    }

    fn entry_for(&self, instance_id: &str) -> Arc<AsyncMutex<DeviceMap>> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries
            .entry(instance_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(DeviceMap::default())))
            .clone()
    }

    /// Resolves and caches the running instance's own cloud instance id,
    /// via the metadata service on first call. Never re-queried after the
    /// first successful resolution.
    pub async fn self_instance_id(
        &self,
        metadata: &dyn ccp_provider::traits::MetadataResolver,
    ) -> Result<String, ProviderError> {
        self.self_instance_id
            .get_or_try_init(|| async { metadata.get("instance-id").await })
            .await
            .cloned()
    }

    /// The device-assignment algorithm (spec.md §4.5, "Device assignment
    /// algorithm"). Populates the instance's device-mapping cache on
    /// first use, then either reports an existing assignment or reserves
    /// the first free device letter.
    pub async fn assign_device(
        &self,
        compute: &dyn ComputeService,
        instance_id: &str,
        volume: &CanonicalVolumeName,
    ) -> Result<DeviceAssignment, ProviderError> {
        let entry = self.entry_for(instance_id);
        let mut map = entry.lock().await;
        self.populate(compute, instance_id, &mut map).await?;

        if let Some((device, _)) = map
            .mapping
            .iter()
            .find(|(_, v)| v.as_str() == volume.volume_id())
        {
            return Ok(DeviceAssignment {
                device: device.clone(),
                already_attached: true,
            });
        }

        let device = device::DEVICE_NAMES
            .iter()
            .find(|d| !map.mapping.contains_key(**d))
            .ok_or(ProviderError::NoDeviceAvailable)?;
        map.mapping
            .insert(device.to_string(), volume.volume_id().to_string());
        Ok(DeviceAssignment {
            device: device.to_string(),
            already_attached: false,
        })
    }

    /// Releases a tentative reservation, but only if it still maps to
    /// `volume_id` (spec.md §4.5 step 2: "erase the entry if and only if
    /// it still maps to this volume-id").
    pub async fn release_reservation(&self, instance_id: &str, device: &str, volume_id: &str) {
        let entry = self.entry_for(instance_id);
        let mut map = entry.lock().await;
        if map.mapping.get(device).map(String::as_str) == Some(volume_id) {
            map.mapping.remove(device);
        }
    }

    /// The device currently reserved for `volume_id` on `instance_id`, if
    /// any. Used by `DetachDisk`, which needs the device name to issue
    /// the remote `DetachVolume` call.
    pub async fn device_for(
        &self,
        compute: &dyn ComputeService,
        instance_id: &str,
        volume_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let entry = self.entry_for(instance_id);
        let mut map = entry.lock().await;
        self.populate(compute, instance_id, &mut map).await?;
        Ok(map
            .mapping
            .iter()
            .find(|(_, v)| v.as_str() == volume_id)
            .map(|(d, _)| d.clone()))
    }

    async fn populate(
        &self,
        compute: &dyn ComputeService,
        instance_id: &str,
        map: &mut DeviceMap,
    ) -> Result<(), ProviderError> {
        if map.populated {
            return Ok(());
        }
        let instances = compute
            .describe_instances(&[instance_id.to_string()], None)
            .await?;
        let instance = instances
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("instance {instance_id}")))?;
        for mapping in instance.block_device_mappings {
            map.mapping.insert(mapping.device_name, mapping.volume_id);
        }
        map.populated = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::test_double::TestDoubleServices;
    use ccp_provider::CloudServices;
    use ccp_provider::types::{BlockDeviceMapping, Instance, InstanceState};
    use std::net::Ipv4Addr;

    fn instance(id: &str, mappings: Vec<BlockDeviceMapping>) -> Instance {
        Instance {
            instance_id: id.to_string(),
            private_dns_name: format!("{id}.internal"),
            private_ip: Ok(Ipv4Addr::new(10, 0, 0, 1)),
            public_ip: None,
            availability_zone: "us-east-1a".to_string(),
            instance_type: "m5.large".to_string(),
            state: InstanceState::Running,
            block_device_mappings: mappings,
            tags: Default::default(),
        }
    }

    #[tokio::test]
    async fn assigns_first_free_device() {
        let services = TestDoubleServices::new();
        services.add_instance(instance("i-1", vec![]));
        let compute = services.compute("us-east-1").await;

        let registry = InstanceRegistry::new();
        let volume = CanonicalVolumeName::new("us-east-1a", "vol-aaa").unwrap();
        let assignment = registry
            .assign_device(compute.as_ref(), "i-1", &volume)
            .await
            .unwrap();
        assert_eq!(assignment.device, "/dev/sdf");
        assert!(!assignment.already_attached);
    }

    #[tokio::test]
    async fn reports_existing_assignment() {
        let services = TestDoubleServices::new();
        services.add_instance(instance(
            "i-1",
            vec![BlockDeviceMapping {
                device_name: "/dev/sdg".to_string(),
                volume_id: "vol-bbb".to_string(),
            }],
        ));
        let compute = services.compute("us-east-1").await;

        let registry = InstanceRegistry::new();
        let volume = CanonicalVolumeName::new("us-east-1a", "vol-bbb").unwrap();
        let assignment = registry
            .assign_device(compute.as_ref(), "i-1", &volume)
            .await
            .unwrap();
        assert_eq!(assignment.device, "/dev/sdg");
        assert!(assignment.already_attached);
    }

    #[tokio::test]
    async fn exhausts_device_table() {
        let mappings = device::DEVICE_NAMES
            .iter()
            .enumerate()
            .map(|(i, d)| BlockDeviceMapping {
                device_name: d.to_string(),
                volume_id: format!("vol-{i}"),
            })
            .collect();
        let services = TestDoubleServices::new();
        services.add_instance(instance("i-1", mappings));
        let compute = services.compute("us-east-1").await;

        let registry = InstanceRegistry::new();
        let volume = CanonicalVolumeName::new("us-east-1a", "vol-new").unwrap();
        let result = registry
            .assign_device(compute.as_ref(), "i-1", &volume)
            .await;
        assert!(matches!(result, Err(ProviderError::NoDeviceAvailable)));
    }

    #[tokio::test]
    async fn release_only_removes_matching_reservation() {
        let services = TestDoubleServices::new();
        services.add_instance(instance("i-1", vec![]));
        let compute = services.compute("us-east-1").await;

        let registry = InstanceRegistry::new();
        let volume = CanonicalVolumeName::new("us-east-1a", "vol-aaa").unwrap();
        let assignment = registry
            .assign_device(compute.as_ref(), "i-1", &volume)
            .await
            .unwrap();

        // A reservation for a different volume-id on the same device must
        // not be clobbered.
        registry
            .release_reservation("i-1", &assignment.device, "vol-different")
            .await;
        let still_there = registry
            .device_for(compute.as_ref(), "i-1", "vol-aaa")
            .await
            .unwrap();
        assert_eq!(still_there.as_deref(), Some(assignment.device.as_str()));

        registry
            .release_reservation("i-1", &assignment.device, "vol-aaa")
            .await;
        let gone = registry
            .device_for(compute.as_ref(), "i-1", "vol-aaa")
            .await
            .unwrap();
        assert_eq!(gone, None);
    }
}
