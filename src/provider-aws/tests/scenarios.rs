//! End-to-end scenarios exercised against the crate's public surface only
//! (`AwsCloudProvider` + `TestDoubleServices`), corresponding to the
//! numbered scenarios in `SPEC_FULL.md` §8.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ccp_provider::types::{Instance, InstanceState, Protocol, ServiceAffinity, ServicePort};
use ccp_provider::{Instances, TcpLoadBalancer, Volumes, Zones};
use ccp_provider_aws::facade::TestDoubleServices;
use ccp_provider_aws::AwsCloudProvider;

fn instance(id: &str, dns: &str, private_ip: Ipv4Addr, public_ip: Option<Ipv4Addr>) -> Instance {
    Instance {
        instance_id: id.to_string(),
        private_dns_name: dns.to_string(),
        private_ip: Ok(private_ip),
        public_ip,
        availability_zone: "us-east-1a".to_string(),
        instance_type: "m5.large".to_string(),
        state: InstanceState::Running,
        block_device_mappings: Vec::new(),
        tags: Default::default(),
    }
}

async fn bootstrap(zone: &str, services: TestDoubleServices) -> AwsCloudProvider {
    let doc = format!("[Global]\nZone = {zone}\nKubernetesClusterTag = test\n");
    AwsCloudProvider::bootstrap(&doc, Arc::new(services))
        .await
        .unwrap()
}

/// S1 — a fresh instance's first volume attach lands on `/dev/sdf` and is
/// reported back under its in-guest name.
#[tokio::test]
async fn s1_volume_first_attach() {
    let services = TestDoubleServices::new();
    services.add_instance(instance(
        "i-1",
        "i-1.internal",
        Ipv4Addr::new(10, 0, 0, 1),
        None,
    ));
    services.add_volume(ccp_provider::types::Volume {
        volume_id: "vol-aaa".to_string(),
        availability_zone: "us-east-1a".to_string(),
        attachments: Vec::new(),
    });
    let services_for_provider = services.clone();
    let provider = bootstrap("us-east-1a", services_for_provider).await;

    let device = provider
        .attach_disk("aws://us-east-1a/vol-aaa", "i-1.internal", false)
        .await
        .unwrap();
    assert_eq!(device, "/dev/xvdf");
    assert_eq!(services.attach_volume_call_count(), 1);
}

/// S2 — attaching a volume that is already mapped on the instance skips
/// the remote `AttachVolume` call entirely.
#[tokio::test]
async fn s2_volume_already_attached() {
    let services = TestDoubleServices::new();
    let mut with_mapping = instance(
        "i-1",
        "i-1.internal",
        Ipv4Addr::new(10, 0, 0, 1),
        None,
    );
    with_mapping.block_device_mappings = vec![ccp_provider::types::BlockDeviceMapping {
        device_name: "/dev/sdg".to_string(),
        volume_id: "vol-bbb".to_string(),
    }];
    services.add_instance(with_mapping);
    services.add_volume(ccp_provider::types::Volume {
        volume_id: "vol-bbb".to_string(),
        availability_zone: "us-east-1a".to_string(),
        attachments: vec![ccp_provider::types::VolumeAttachment {
            instance_id: "i-1".to_string(),
            device: "/dev/sdg".to_string(),
            state: ccp_provider::types::AttachmentState::Attached,
        }],
    });
    let services_for_provider = services.clone();
    let provider = bootstrap("us-east-1a", services_for_provider).await;

    let device = provider
        .attach_disk("aws://us-east-1a/vol-bbb", "i-1.internal", false)
        .await
        .unwrap();
    assert_eq!(device, "/dev/xvdg");
    assert_eq!(services.attach_volume_call_count(), 0);
}

/// S5 — a valid zone derives its region and is accepted; an unrecognized
/// region is rejected with `ConfigInvalid`.
#[tokio::test]
async fn s5_config_zone_derives_region() {
    let provider = bootstrap("eu-west-1b", TestDoubleServices::new()).await;
    assert_eq!(provider.zone().region, "eu-west-1");

    let doc = "[Global]\nZone = xx-yy-9z\n";
    let result = AwsCloudProvider::bootstrap(doc, Arc::new(TestDoubleServices::new())).await;
    assert!(matches!(
        result,
        Err(ccp_provider::ProviderError::ConfigInvalid(_))
    ));
}

/// S6 — address resolution returns the fixed `[InternalIP, LegacyHostIP,
/// ExternalIP]` ordering.
#[tokio::test]
async fn s6_addresses_fixed_order() {
    let services = TestDoubleServices::new();
    services.add_instance(instance(
        "i-1",
        "i-1.internal",
        Ipv4Addr::new(10, 0, 0, 7),
        Some(Ipv4Addr::new(54, 1, 2, 3)),
    ));
    let services_for_provider = services.clone();
    let provider = bootstrap("us-east-1a", services_for_provider).await;

    let addresses = provider.node_addresses("i-1.internal").await.unwrap();
    assert_eq!(
        addresses,
        vec![
            ccp_provider::types::NodeAddress::InternalIp(Ipv4Addr::new(10, 0, 0, 7)),
            ccp_provider::types::NodeAddress::LegacyHostIp(Ipv4Addr::new(10, 0, 0, 7)),
            ccp_provider::types::NodeAddress::ExternalIp(Ipv4Addr::new(54, 1, 2, 3)),
        ]
    );
}

/// A full volume + load balancer workflow against a single provider,
/// exercising the seam between the two capability traits sharing one
/// underlying facade and instance registry.
#[tokio::test]
async fn combined_volume_and_load_balancer_workflow() {
    let services = TestDoubleServices::new();
    services.add_instance(instance(
        "i-1",
        "i-1.internal",
        Ipv4Addr::new(10, 0, 0, 1),
        None,
    ));
    let mut tags = std::collections::HashMap::new();
    tags.insert("Name".to_string(), "kubernetes-vpc".to_string());
    services.add_vpc(ccp_provider::types::Vpc {
        vpc_id: "vpc-1".to_string(),
        tags,
    });
    services.add_subnet(ccp_provider::types::Subnet {
        subnet_id: "subnet-1".to_string(),
        vpc_id: "vpc-1".to_string(),
        availability_zone: "us-east-1a".to_string(),
    });
    let services_for_provider = services.clone();
    let provider = bootstrap("us-east-1a", services_for_provider).await;

    let volume_name = provider
        .create_volume(2048, std::collections::HashMap::new())
        .await
        .unwrap();
    let device = provider
        .attach_disk(&volume_name, "i-1.internal", false)
        .await
        .unwrap();
    assert_eq!(device, "/dev/xvdf");

    let status = provider
        .ensure_tcp_load_balancer(
            "svc-combined",
            "us-east-1",
            &["i-1.internal".to_string()],
            &[ServicePort {
                protocol: Protocol::Tcp,
                port: 80,
                node_port: 30080,
            }],
            ServiceAffinity::None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(status.ingress[0].hostname, "svc-combined.elb.test");

    provider.detach_disk(&volume_name, "i-1.internal").await.unwrap();
    provider.delete_volume(&volume_name).await.unwrap();
    provider
        .delete_tcp_load_balancer("svc-combined", "us-east-1")
        .await
        .unwrap();

    assert!(!provider
        .tcp_load_balancer_exists("svc-combined", "us-east-1")
        .await
        .unwrap());
}
