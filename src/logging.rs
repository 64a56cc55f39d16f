//! Tracing setup for embedding applications.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted tracing subscriber honoring `RUST_LOG` (default
/// `info`). No-op if a global subscriber is already set.
pub fn init() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = fmt().with_env_filter(filter).try_init();
}
