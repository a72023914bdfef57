//! Tracing initialisation for the host process.

use tracing_subscriber::EnvFilter;

/// Initialise the global subscriber once.
///
/// Filter via `OMNI_GLASS_LOG` (falling back to `RUST_LOG`, then
/// `info`). Safe to call repeatedly; later calls are no-ops.
pub fn init_tracing() {
    let filter = std::env::var("OMNI_GLASS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init();
}
