//! `MetadataResolver` implementation backed by the instance-local metadata
//! HTTP endpoint (`SPEC_FULL.md` §4.2).

use async_trait::async_trait;
use ccp_aws_util::{MetadataHttpClient, MetadataHttpError};
use ccp_provider::error::ProviderError;
use ccp_provider::traits::MetadataResolver;

pub struct AwsMetadataResolver {
    client: MetadataHttpClient,
}

impl AwsMetadataResolver {
    pub fn new(client: MetadataHttpClient) -> Self {
        AwsMetadataResolver { client }
    }
}

impl Default for AwsMetadataResolver {
    fn default() -> Self {
        AwsMetadataResolver::new(MetadataHttpClient::default())
    }
}

#[async_trait]
impl MetadataResolver for AwsMetadataResolver {
    async fn get(&self, key: &str) -> Result<String, ProviderError> {
        self.client.get(key).await.map_err(|e| match e {
            MetadataHttpError::Transport(e) => {
                ProviderError::MetadataUnavailable(format!("transport error fetching {key}: {e}"))
            }
            MetadataHttpError::Status(status) => {
                ProviderError::MetadataUnavailable(format!("{key} returned status {status}"))
            }
        })
    }
}
