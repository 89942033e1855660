//! Logging (§4.10): installs the crate's single structured logger.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber, controlled by `LOG_LEVEL`
/// (falling back to `info`). Must be called exactly once, at process start.
pub fn init() {
  let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}
