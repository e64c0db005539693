//! storectl-core - pluggable console store
//!
//! A [`StoreRegistry`] maps names to [`Store`] implementations. The built-in
//! [`StableStore`] opens a master pool, a second master pool for
//! transactions, and an optional read replica (falling back to the master),
//! then hands the master/replica pair to its feature sub-stores.
//!
//! ```ignore
//! let registry = Arc::new(StoreRegistry::with_builtin_stores()?);
//! let config = ConsoleConfig::load("console.yaml")?;
//! let store = registry.get(&config.store.name)?;
//! store.initialize(&config.store).await?;
//! store.try_lock("config-sync", "node-a", Duration::from_secs(30)).await?;
//! store.destroy().await?;
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod registry;
pub mod repos;
pub mod stable;

pub use config::{
    parse_database_config, parse_store_config, ConnectionDescriptor, ConsoleConfig, LoggerConfig,
    StoreConfig, DEFAULT_CONN_MAX_LIFETIME_SECS,
};
pub use error::{Result, StoreError};
pub use handle::{ConnectionHandle, ConnectionOpener, ConnectionRole, IsolationLevel, MySqlOpener};
pub use registry::{Store, StoreRegistry};
pub use repos::{
    AlarmCallback, AlarmRule, AlarmRuleFilter, AlarmRuleStore, AlterExpr, LockRecord, LockStore,
};
pub use stable::{StableStore, StoreConnections, STORE_NAME};
