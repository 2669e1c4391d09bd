//! The error taxonomy shared by every cloud provider capability.
//!
//! Variants are kinds, not call-site-specific types: a `CloudApiError` may
//! originate from EC2, the classic load balancer API, or anywhere else
//! behind the facade. Context belongs in the message, not in a new variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Malformed zone, unknown region, or malformed volume/instance name.
    #[error("invalid cloud provider configuration: {0}")]
    ConfigInvalid(String),

    /// The instance metadata service returned a non-200 status or the
    /// request failed at the transport layer.
    #[error("instance metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// Zero matches where exactly one was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one match where exactly one was required.
    #[error("ambiguous: {0}")]
    Ambiguous(String),

    /// An unclassified failure from the underlying cloud SDK, passed
    /// through with a context prefix.
    #[error("cloud API error: {0}")]
    CloudApiError(String),

    /// An attach/detach poll exceeded its attempt budget.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The cloud returned a structurally unexpected response, e.g. a null
    /// where a response was required.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// An address or identifier string did not parse.
    #[error("invalid data: {0}")]
    DataInvalid(String),

    /// A caller asked for a read-only volume attachment.
    #[error("read-only volume attachment is not supported")]
    ReadOnlyUnsupported,

    /// All device letters for an instance are already in use.
    #[error("no device letters available on instance")]
    NoDeviceAvailable,

    /// A load balancer session affinity other than `None` was requested.
    #[error("unsupported load balancer affinity: {0}")]
    UnsupportedAffinity(String),

    /// A caller-supplied public IP was requested for a load balancer.
    #[error("caller-supplied load balancer IP is not supported")]
    PublicIpNotSupported,
}

pub type Result<T> = std::result::Result<T, ProviderError>;
