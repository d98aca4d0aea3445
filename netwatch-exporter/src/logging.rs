//! Logging setup

/// Initialize the `tracing` subscriber on stdout.
///
/// Level comes from RUST_LOG, defaulting to "info". Safe to call more than
/// once: later calls are ignored.
pub fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
