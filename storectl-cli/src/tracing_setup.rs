//! Tracing setup for the storectl CLI
//!
//! Usage:
//!   storectl --debug ...                     # Debug logging to stderr
//!   RUST_LOG=storectl_core=debug storectl    # Fine-grained log control
//!
//! Without `RUST_LOG`, the filter comes from `--debug`, then from the
//! config file's `logger.level`, then defaults to `warn` so command output
//! stays clean.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "warn";

/// Tracing configuration options
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Enable debug logging (unless RUST_LOG is set)
    pub debug: bool,
    /// `logger.level` from the console config, if one was loaded
    pub level: Option<String>,
}

impl TracingConfig {
    fn default_directive(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            self.level.as_deref().unwrap_or(DEFAULT_LEVEL)
        }
    }
}

/// Install a compact stderr subscriber.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = config.default_directive();
            EnvFilter::try_new(directive)
                .map_err(|err| anyhow!("invalid log level {directive:?}: {err}"))?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.debug)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
