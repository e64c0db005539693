//! Store plugin contract and the name → store registry.
//!
//! The registry is filled once during bootstrap (`register` needs `&mut`),
//! then shared read-only, typically behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::repos::{AlarmRuleStore, LockStore};
use crate::stable::StableStore;

/// A named, pluggable persistence backend.
///
/// Feature operations come from the sub-store supertraits; implementations
/// forward them to the sub-stores they compose.
#[async_trait]
pub trait Store: LockStore + AlarmRuleStore {
    /// Registered name; fixed for the implementation.
    fn name(&self) -> &str;

    /// Open connections and build sub-stores. A no-op when already started.
    async fn initialize(&self, config: &StoreConfig) -> Result<()>;

    /// Release all connections. Always succeeds; close failures are logged.
    async fn destroy(&self) -> Result<()>;

    /// Round-trip every distinct open connection.
    async fn ping(&self) -> Result<()>;
}

/// Maps store names to implementations.
#[derive(Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn Store>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every store shipped with this crate.
    pub fn with_builtin_stores() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(StableStore::new()))?;
        Ok(registry)
    }

    /// Record a store under its name.
    ///
    /// # Errors
    ///
    /// `DuplicateStoreName` if the name is taken; the existing entry is kept.
    pub fn register(&mut self, store: Arc<dyn Store>) -> Result<()> {
        let name = store.name().to_string();
        if self.stores.contains_key(&name) {
            return Err(StoreError::duplicate_name(name));
        }
        info!(store = %name, "registered store");
        self.stores.insert(name, store);
        Ok(())
    }

    /// Look up a store by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Store>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.names())
            .finish()
    }
}
