//! Region-scoped AWS SDK client construction.

use aws_types::region::Region;

/// Builds a region-scoped EC2 client from the ambient AWS credential
/// chain (environment, profile, or instance role).
pub async fn ec2_client(region: &str) -> aws_sdk_ec2::Client {
    let config = aws_config::from_env()
        .region(Region::new(region.to_string()))
        .load()
        .await;
    aws_sdk_ec2::Client::new(&config)
}

/// Builds a region-scoped classic ELB client from the same credential
/// chain as [`ec2_client`].
pub async fn elb_client(region: &str) -> aws_sdk_elasticloadbalancing::Client {
    let config = aws_config::from_env()
        .region(Region::new(region.to_string()))
        .load()
        .await;
    aws_sdk_elasticloadbalancing::Client::new(&config)
}
