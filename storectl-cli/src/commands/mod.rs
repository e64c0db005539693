//! Command implementations for the storectl CLI

pub mod check;
pub mod show_config;
pub mod stores;

pub use check::run_check;
pub use show_config::run_show_config;
pub use stores::run_stores;

use storectl_core::ConnectionDescriptor;

/// One-line, password-free rendering of a connection descriptor.
pub(crate) fn describe(desc: &ConnectionDescriptor) -> String {
    fn or_default(value: Option<u32>) -> String {
        value.map_or_else(|| "default".to_string(), |v| v.to_string())
    }

    format!(
        "{}://{}@{}/{} (maxOpen={}, maxIdle={}, lifetime={}s, isolation={})",
        desc.driver_kind,
        desc.user,
        desc.address,
        desc.database_name,
        or_default(desc.max_open_connections),
        or_default(desc.max_idle_connections),
        desc.conn_max_lifetime_secs,
        or_default(desc.tx_isolation_level),
    )
}
