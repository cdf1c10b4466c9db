//! Logging setup for binaries and tests. The library itself only emits
//! `tracing` events and never installs a subscriber on its own.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `semaquery=debug`.
pub const LOG_ENV: &str = "SEMAQUERY_LOG";

/// Install a fmt subscriber filtered by `SEMAQUERY_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
