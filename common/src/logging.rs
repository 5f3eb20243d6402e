//! `tracing` setup shared by the `leaf` and `superpeer` binaries.

/// Installs a `tracing-subscriber` formatter honoring `RUST_LOG`, defaulting to `info` when
/// unset. Every span created downstream of node construction should carry a `node` field (the
/// node's own address) so logs from concurrent connection handlers are distinguishable.
pub fn init(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
