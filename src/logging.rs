//! Logging configuration for db-courier.
//!
//! The dispatcher itself only emits `tracing` events; embedding hosts that do
//! not install their own subscriber can use this stderr initializer.

use tracing_subscriber::EnvFilter;

/// Initializes logging to stderr.
///
/// Honors `RUST_LOG` when set, defaulting to `info`. Safe to call when a
/// subscriber is already installed; the existing one wins.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
