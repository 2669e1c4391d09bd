//! Thin wrappers around the vendor AWS SDK: client construction scoped to
//! a discovered region, a metadata-endpoint HTTP client, and a pagination
//! helper. `ccp-provider-aws`'s `Real` facade is built on top of this
//! crate; no other crate in the workspace depends on it.

pub mod client;
pub mod metadata_client;
pub mod paginate;

pub use client::{ec2_client, elb_client};
pub use metadata_client::{MetadataHttpClient, MetadataHttpError};
pub use paginate::collect_paginated;
