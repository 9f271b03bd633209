//! Tracing setup for embedding hosts and tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global subscriber honouring `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).try_init();
}
