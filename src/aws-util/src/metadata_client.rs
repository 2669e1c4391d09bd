//! A tiny client for the instance-local metadata endpoint (spec.md §4.2,
//! §6). A fixed link-local address, a 10-second deadline, no retries, no
//! caching: exactly what spec.md specifies and nothing more.

use std::time::Duration;

const METADATA_BASE_URL: &str = "http://169.254.169.254/latest/meta-data";
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// A thin wrapper around a [`reqwest::Client`] pinned to the metadata
/// base URL and the 10-second deadline. Cheap to clone: `reqwest::Client`
/// is internally `Arc`-backed.
#[derive(Clone, Debug)]
pub struct MetadataHttpClient {
    inner: reqwest::Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataHttpError {
    #[error("metadata request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metadata service returned status {0}")]
    Status(reqwest::StatusCode),
}

impl Default for MetadataHttpClient {
    fn default() -> Self {
        MetadataHttpClient::new(METADATA_BASE_URL)
    }
}

impl MetadataHttpClient {
    /// Exposed for tests, which point `base_url` at a local mock server
    /// instead of the real link-local address.
    pub fn new(base_url: impl Into<String>) -> Self {
        let inner = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .expect("reqwest client with only a timeout set cannot fail to build");
        MetadataHttpClient {
            inner,
            base_url: base_url.into(),
        }
    }

    /// Fetches `<base>/<key>`, returning the raw response body on HTTP
    /// 200. Any other status, or a transport-level failure, is reported
    /// without retry.
    pub async fn get(&self, key: &str) -> Result<String, MetadataHttpError> {
        let url = format!("{}/{key}", self.base_url);
        let response = self.inner.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MetadataHttpError::Status(response.status()));
        }
        Ok(response.text().await?)
    }
}
