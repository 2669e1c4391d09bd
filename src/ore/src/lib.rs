//! Internal utility library shared by binaries that embed the cloud
//! provider: CLI-arg parsing conventions and `tracing` subscriber
//! bootstrap. The capability logic in `ccp-provider`/`ccp-provider-aws`
//! does not depend on this crate; it is ambient scaffolding for callers.

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "tracing_")]
#[path = "tracing_.rs"]
pub mod tracing;
