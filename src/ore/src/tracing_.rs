//! `tracing` subscriber bootstrap, gated behind the `tracing_` feature so
//! that `ccp-provider` and `ccp-provider-aws` can depend on `tracing`
//! directly for instrumentation without pulling in a subscriber.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber that logs to stderr, honoring
/// `RUST_LOG` (falling back to `default_filter` when unset).
///
/// Call this once, near the top of `main`, in any binary that embeds the
/// cloud provider. Panics if a global subscriber is already installed.
pub fn init_tracing_subscriber(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
