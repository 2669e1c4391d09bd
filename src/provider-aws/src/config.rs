//! Config Loader: parses the `[Global]` key=value configuration document,
//! resolves a missing zone from the metadata service, and validates the
//! derived region (`SPEC_FULL.md` §4.1).
//!
//! There is no ini-parsing crate anywhere in this workspace's dependency
//! tree; this is a narrow, hand-rolled grammar in the same spirit as the
//! rest of the corpus's small bespoke parsers, not a general-purpose ini
//! reader.

use ccp_provider::error::ProviderError;
use ccp_provider::traits::MetadataResolver;
use ccp_provider::types::{region_of, CloudConfig, KNOWN_REGIONS};

const SECTION_GLOBAL: &str = "Global";
const KEY_ZONE: &str = "Zone";
const KEY_CLUSTER_TAG: &str = "KubernetesClusterTag";

/// The configuration document's raw contents, before zone resolution and
/// region validation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ParsedDocument {
    zone: Option<String>,
    cluster_tag: Option<String>,
}

/// Parses a `[Global]\nKey = Value` document. Unknown sections are
/// ignored; unknown keys within `[Global]` are ignored. A key/value line
/// outside of any section is ignored.
fn parse_document(doc: &str) -> ParsedDocument {
    let mut parsed = ParsedDocument::default();
    let mut section = String::new();
    for line in doc.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = name.trim().to_string();
            continue;
        }
        if section != SECTION_GLOBAL {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().to_string();
        if key.eq_ignore_ascii_case(KEY_ZONE) {
            parsed.zone = Some(value);
        } else if key.eq_ignore_ascii_case(KEY_CLUSTER_TAG) {
            parsed.cluster_tag = Some(value);
        }
    }
    parsed
}

/// `len(zone) > 1` (spec.md §3).
fn validate_zone(zone: &str) -> Result<(), ProviderError> {
    if zone.len() <= 1 {
        return Err(ProviderError::ConfigInvalid(format!(
            "zone {zone:?} is too short to contain a region and an AZ letter"
        )));
    }
    Ok(())
}

fn validate_region(region: &str) -> Result<(), ProviderError> {
    if !KNOWN_REGIONS.contains(&region) {
        return Err(ProviderError::ConfigInvalid(format!(
            "region {region:?} (derived from zone) is not a known region"
        )));
    }
    Ok(())
}

/// Loads and validates the configuration, falling back to the metadata
/// service for a missing zone. Does not resolve `cluster_tag` from the
/// "self" instance's tags; that step needs a `ComputeService` and is the
/// caller's (`AwsCloudProvider::bootstrap`'s) responsibility.
pub async fn load_config(
    doc: &str,
    metadata: &dyn MetadataResolver,
) -> Result<CloudConfig, ProviderError> {
    let parsed = parse_document(doc);
    let zone = match parsed.zone {
        Some(zone) => zone,
        None => metadata.get("placement/availability-zone").await?,
    };
    validate_zone(&zone)?;
    validate_region(region_of(&zone))?;
    Ok(CloudConfig {
        zone,
        cluster_tag: parsed.cluster_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubMetadata(&'static str);

    #[async_trait]
    impl MetadataResolver for StubMetadata {
        async fn get(&self, _key: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn parses_zone_and_cluster_tag() {
        let doc = "[Global]\nZone = us-east-1a\nKubernetesClusterTag = my-cluster\n";
        let parsed = parse_document(doc);
        assert_eq!(parsed.zone.as_deref(), Some("us-east-1a"));
        assert_eq!(parsed.cluster_tag.as_deref(), Some("my-cluster"));
    }

    #[test]
    fn ignores_keys_outside_global_section() {
        let doc = "[Other]\nZone = us-east-1a\n";
        let parsed = parse_document(doc);
        assert_eq!(parsed.zone, None);
    }

    #[tokio::test]
    async fn derives_region_from_zone() {
        let config = load_config("[Global]\nZone = eu-west-1b\n", &StubMetadata("unused"))
            .await
            .unwrap();
        assert_eq!(config.region(), "eu-west-1");
    }

    #[tokio::test]
    async fn rejects_unknown_region() {
        let result = load_config("[Global]\nZone = xx-yy-9z\n", &StubMetadata("unused")).await;
        assert!(matches!(result, Err(ProviderError::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn falls_back_to_metadata_for_missing_zone() {
        let config = load_config("[Global]\n", &StubMetadata("us-west-2c"))
            .await
            .unwrap();
        assert_eq!(config.zone, "us-west-2c");
    }
}
