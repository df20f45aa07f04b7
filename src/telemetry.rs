// 13.0 telemetry.rs: subscriber setup for binaries. the library itself only emits.

use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Calling it twice keeps the first subscriber.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
