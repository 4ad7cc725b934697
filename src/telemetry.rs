//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Installs a JSON subscriber writing to stderr, filtered by `RUST_LOG`
/// (default `info`). Stdout stays reserved for command output.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
