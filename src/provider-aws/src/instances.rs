//! `Instances`/`Zones` implementation: node address/identity resolution
//! and allocatable-resource lookup (`SPEC_FULL.md` §4.4).

use async_trait::async_trait;
use ccp_provider::error::ProviderError;
use ccp_provider::traits::{Instances, Zones};
use ccp_provider::types::{NodeAddress, NodeResources, Zone};
use regex::Regex;

use crate::AwsCloudProvider;

#[async_trait]
impl Instances for AwsCloudProvider {
    async fn node_addresses(&self, name: &str) -> Result<Vec<NodeAddress>, ProviderError> {
        let instance = self.lookup_instance_by_name(name).await?;
        let private_ip = instance.private_ip.clone().map_err(|raw| {
            ProviderError::DataInvalid(format!(
                "instance {} has an unparseable private ip address {raw:?}",
                instance.instance_id
            ))
        })?;
        let mut addresses = vec![
            NodeAddress::InternalIp(private_ip),
            NodeAddress::LegacyHostIp(private_ip),
        ];
        if let Some(public_ip) = instance.public_ip {
            addresses.push(NodeAddress::ExternalIp(public_ip));
        }
        Ok(addresses)
    }

    async fn instance_id(&self, name: &str) -> Result<String, ProviderError> {
        let instance = self.lookup_instance_by_name(name).await?;
        Ok(format!(
            "/{}/{}",
            instance.availability_zone, instance.instance_id
        ))
    }

    async fn external_id(&self, name: &str) -> Result<String, ProviderError> {
        Ok(self.lookup_instance_by_name(name).await?.instance_id)
    }

    async fn list(&self, name_regexp: &str) -> Result<Vec<String>, ProviderError> {
        let pattern = name_regexp.trim_matches('"');
        let regex = Regex::new(pattern)
            .map_err(|e| ProviderError::DataInvalid(format!("invalid name pattern {pattern:?}: {e}")))?;

        let compute = self.services.compute(self.region()).await;
        let instances = compute.describe_instances(&[], None).await?;
        Ok(instances
            .into_iter()
            .filter(|i| !matches!(i.state, ccp_provider::types::InstanceState::Pending))
            .filter(|i| i.tags.get("Name").map(|n| regex.is_match(n)).unwrap_or(false))
            .map(|i| i.private_dns_name)
            .collect())
    }

    async fn node_resources(&self, name: &str) -> Result<NodeResources, ProviderError> {
        let instance = self.lookup_instance_by_name(name).await?;
        Ok(ccp_provider::resources::node_resources_for_instance_type(&instance.instance_type)
            .unwrap_or_default())
    }
}

impl Zones for AwsCloudProvider {
    fn zone(&self) -> Zone {
        let config = self.config();
        Zone {
            failure_domain: config.zone.clone(),
            region: config.region().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::test_double::TestDoubleServices;
    use ccp_provider::types::{Instance, InstanceState};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn instance(dns: &str, tags: &[(&str, &str)], state: InstanceState) -> Instance {
        Instance {
            instance_id: format!("i-{dns}"),
            private_dns_name: dns.to_string(),
            private_ip: Ok(Ipv4Addr::new(10, 0, 0, 7)),
            public_ip: Some(Ipv4Addr::new(54, 1, 2, 3)),
            availability_zone: "us-east-1a".to_string(),
            instance_type: "m5.large".to_string(),
            state,
            block_device_mappings: Vec::new(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
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
    async fn addresses_are_in_fixed_order() {
        let services = TestDoubleServices::new();
        services.add_instance(instance("node-a", &[], InstanceState::Running));
        let provider = provider_with(services).await;

        let addresses = provider.node_addresses("node-a").await.unwrap();
        assert_eq!(
            addresses,
            vec![
                NodeAddress::InternalIp(Ipv4Addr::new(10, 0, 0, 7)),
                NodeAddress::LegacyHostIp(Ipv4Addr::new(10, 0, 0, 7)),
                NodeAddress::ExternalIp(Ipv4Addr::new(54, 1, 2, 3)),
            ]
        );
    }

    #[tokio::test]
    async fn unparseable_private_ip_surfaces_as_data_invalid() {
        let services = TestDoubleServices::new();
        let mut bad_ip = instance("node-a", &[], InstanceState::Running);
        bad_ip.private_ip = Err("not-an-ip".to_string());
        services.add_instance(bad_ip);
        let provider = provider_with(services).await;

        let result = provider.node_addresses("node-a").await;
        assert!(matches!(result, Err(ProviderError::DataInvalid(_))));
    }

    #[tokio::test]
    async fn list_excludes_pending_but_matches_name_regex() {
        let services = TestDoubleServices::new();
        services.add_instance(instance("node-a", &[("Name", "web-1")], InstanceState::Running));
        services.add_instance(instance("node-b", &[("Name", "web-2")], InstanceState::Pending));
        services.add_instance(instance("node-c", &[("Name", "db-1")], InstanceState::Running));
        let provider = provider_with(services).await;

        let mut matched = provider.list("\"web-.*\"").await.unwrap();
        matched.sort();
        assert_eq!(matched, vec!["node-a".to_string()]);
    }

    #[tokio::test]
    async fn unknown_instance_type_is_null_resources() {
        let services = TestDoubleServices::new();
        let mut unknown_type = instance("node-a", &[], InstanceState::Running);
        unknown_type.instance_type = "quantum.huge".to_string();
        services.add_instance(unknown_type);
        let provider = provider_with(services).await;

        let resources = provider.node_resources("node-a").await.unwrap();
        assert_eq!(resources, NodeResources::default());
    }

    #[tokio::test]
    async fn zone_reflects_bootstrap_config() {
        let provider = provider_with(TestDoubleServices::new()).await;
        let zone = provider.zone();
        assert_eq!(zone.failure_domain, "us-east-1a");
        assert_eq!(zone.region, "us-east-1");
    }

    #[test]
    #[should_panic(expected = "bootstrap")]
    fn zone_panics_before_bootstrap() {
        let provider = AwsCloudProvider {
            config: std::sync::OnceLock::new(),
            services: Arc::new(TestDoubleServices::new()),
            registry: crate::registry::InstanceRegistry::new(),
            lb_clients: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        };
        let _ = provider.zone();
    }
}
