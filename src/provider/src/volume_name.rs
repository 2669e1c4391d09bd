//! The canonical volume name: the only volume identifier that crosses the
//! core's boundary (spec.md §3, §6).

use std::fmt;
use std::str::FromStr;

use crate::error::ProviderError;

const SCHEME: &str = "aws";
const VOLUME_ID_PREFIX: &str = "vol-";

/// `aws://<az>/<volume-id>`.
///
/// Parsing validates the scheme, that the path is a single `vol-...` id,
/// and that the host (AZ) is non-empty. It does *not* validate the AZ
/// against the known-regions table — spec.md §9 calls this out as a wart
/// in the original, not a feature, and this rewrite preserves it rather
/// than silently tightening behavior a caller might depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalVolumeName {
    availability_zone: String,
    volume_id: String,
}

impl CanonicalVolumeName {
    pub fn new(
        availability_zone: impl Into<String>,
        volume_id: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let availability_zone = availability_zone.into();
        let volume_id = volume_id.into();
        if availability_zone.is_empty() {
            return Err(ProviderError::ConfigInvalid(
                "canonical volume name has an empty availability zone".into(),
            ));
        }
        if !volume_id.starts_with(VOLUME_ID_PREFIX) {
            return Err(ProviderError::ConfigInvalid(format!(
                "canonical volume name id {volume_id:?} does not start with {VOLUME_ID_PREFIX:?}"
            )));
        }
        Ok(CanonicalVolumeName {
            availability_zone,
            volume_id,
        })
    }

    pub fn availability_zone(&self) -> &str {
        &self.availability_zone
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }
}

impl fmt::Display for CanonicalVolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}/{}", self.availability_zone, self.volume_id)
    }
}

impl FromStr for CanonicalVolumeName {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(&format!("{SCHEME}://")).ok_or_else(|| {
            ProviderError::ConfigInvalid(format!("volume name {s:?} has an unexpected scheme"))
        })?;
        let (az, path) = rest.split_once('/').ok_or_else(|| {
            ProviderError::ConfigInvalid(format!("volume name {s:?} is missing a volume id"))
        })?;
        if path.is_empty() || path.contains('/') {
            return Err(ProviderError::ConfigInvalid(format!(
                "volume name {s:?} does not have a single leading slash before the id"
            )));
        }
        CanonicalVolumeName::new(az, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        for (az, id) in [
            ("us-east-1a", "vol-aaaaaaaa"),
            ("eu-west-1b", "vol-0123456789abcdef0"),
            ("ap-southeast-2c", "vol-z"),
        ] {
            let name = format!("aws://{az}/{id}");
            let parsed: CanonicalVolumeName = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
            assert_eq!(parsed.availability_zone(), az);
            assert_eq!(parsed.volume_id(), id);
        }
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!("gcp://us-east-1a/vol-aaa".parse::<CanonicalVolumeName>().is_err());
    }

    #[test]
    fn rejects_missing_vol_prefix() {
        assert!("aws://us-east-1a/aaa".parse::<CanonicalVolumeName>().is_err());
    }

    #[test]
    fn rejects_empty_az() {
        assert!("aws:///vol-aaa".parse::<CanonicalVolumeName>().is_err());
    }

    #[test]
    fn rejects_extra_path_segments() {
        assert!("aws://us-east-1a/vol-aaa/extra"
            .parse::<CanonicalVolumeName>()
            .is_err());
    }
}
