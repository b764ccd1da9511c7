//! Logging setup
//!
//! The bridge emits `tracing` events at the C boundary only, never per buffer. A host that
//! already collects `tracing` output keeps its own subscriber; otherwise a plugin configured with
//! a `log_filter` installs a stderr formatter on first init.

use tracing_subscriber::EnvFilter;

use crate::Error;

/// Installs a global `tracing` subscriber using the given filter directives
///
/// Does nothing if a global subscriber is already installed, whether by the host, by an earlier
/// plugin context or by a previous call.
pub fn init(filter: &str) -> Result<(), Error> {
    let env_filter = EnvFilter::try_new(filter)
        .map_err(|e| Error::InvalidConfig(format!("log_filter \"{filter}\": {e}")))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}
