//! Binary entry point for the zgate server.
//!
//! The runtime logic lives in `zgate::server`, so this binary only installs
//! the log subscriber and delegates to the shared library code.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zgate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    zgate::server::run()
}
