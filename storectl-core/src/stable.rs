//! The default store: master, master-tx and replica pools plus the feature
//! sub-stores built on top of them.
//!
//! State machine: `Unstarted --initialize--> Started --destroy--> Unstarted`.
//! A failed `initialize` leaves the store unstarted. If the replica fails to
//! open, the master handles already opened stay recorded until `destroy`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{parse_database_config, StoreConfig};
use crate::error::{Result, StoreError};
use crate::handle::{ConnectionHandle, ConnectionOpener, ConnectionRole, MySqlOpener};
use crate::registry::Store;
use crate::repos::{
    AlarmRule, AlarmRuleFilter, AlarmRuleStore, LockRecord, LockStore, MySqlAlarmRuleStore,
    MySqlLockStore,
};

/// Registered name of the stable store.
pub const STORE_NAME: &str = "defaultStore";

#[derive(Default)]
struct StoreState {
    master: Option<Arc<ConnectionHandle>>,
    master_tx: Option<Arc<ConnectionHandle>>,
    replica: Option<Arc<ConnectionHandle>>,
    started: bool,
    locks: Option<MySqlLockStore>,
    alarm_rules: Option<MySqlAlarmRuleStore>,
}

/// Point-in-time view of the stable store's handles.
#[derive(Debug, Clone)]
pub struct StoreConnections {
    pub started: bool,
    pub master: Option<Arc<ConnectionHandle>>,
    pub master_tx: Option<Arc<ConnectionHandle>>,
    pub replica: Option<Arc<ConnectionHandle>>,
}

impl StoreConnections {
    /// True when reads are served by the master pool itself.
    pub fn replica_aliases_master(&self) -> bool {
        match (&self.master, &self.replica) {
            (Some(master), Some(replica)) => Arc::ptr_eq(master, replica),
            _ => false,
        }
    }
}

/// Composite store owning all connections.
pub struct StableStore {
    opener: Arc<dyn ConnectionOpener>,
    state: RwLock<StoreState>,
}

impl Default for StableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StableStore {
    pub fn new() -> Self {
        Self::with_opener(Arc::new(MySqlOpener))
    }

    /// Use a custom opener for every handle this store creates.
    pub fn with_opener(opener: Arc<dyn ConnectionOpener>) -> Self {
        Self {
            opener,
            state: RwLock::new(StoreState::default()),
        }
    }

    pub async fn is_started(&self) -> bool {
        self.state.read().await.started
    }

    pub async fn connections(&self) -> StoreConnections {
        let state = self.state.read().await;
        StoreConnections {
            started: state.started,
            master: state.master.clone(),
            master_tx: state.master_tx.clone(),
            replica: state.replica.clone(),
        }
    }

    async fn locks(&self) -> Result<MySqlLockStore> {
        self.state
            .read()
            .await
            .locks
            .clone()
            .ok_or_else(|| StoreError::not_started(STORE_NAME))
    }

    async fn alarm_rules(&self) -> Result<MySqlAlarmRuleStore> {
        self.state
            .read()
            .await
            .alarm_rules
            .clone()
            .ok_or_else(|| StoreError::not_started(STORE_NAME))
    }
}

/// Close every handle, skipping a replica that aliases the master.
///
/// All handles are attempted; failures are logged and counted.
pub(crate) async fn release_handles(
    master: Option<Arc<ConnectionHandle>>,
    master_tx: Option<Arc<ConnectionHandle>>,
    replica: Option<Arc<ConnectionHandle>>,
) -> usize {
    let replica = replica.filter(|replica| match &master {
        Some(master) => !Arc::ptr_eq(replica, master),
        None => true,
    });

    let mut failures = 0;
    for handle in [master, master_tx, replica].into_iter().flatten() {
        if let Err(err) = handle.close().await {
            warn!(role = %handle.role(), error = %err, "failed to close database connection");
            failures += 1;
        }
    }
    failures
}

#[async_trait]
impl Store for StableStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    async fn initialize(&self, config: &StoreConfig) -> Result<()> {
        let mut state = self.state.write().await;
        if state.started {
            return Ok(());
        }

        let (master_config, slave_config) = parse_database_config(STORE_NAME, &config.option)?;

        if state.master.is_some() || state.master_tx.is_some() || state.replica.is_some() {
            warn!("releasing handles left by an earlier failed initialize");
            release_handles(
                state.master.take(),
                state.master_tx.take(),
                state.replica.take(),
            )
            .await;
        }

        let master = Arc::new(self.opener.open(ConnectionRole::Master, &master_config).await?);
        state.master = Some(Arc::clone(&master));

        let master_tx = Arc::new(
            self.opener
                .open(ConnectionRole::MasterTx, &master_config)
                .await?,
        );
        state.master_tx = Some(master_tx);

        let replica = match slave_config {
            Some(slave_config) => {
                info!(config = ?slave_config, "[Store][database] use slave database config");
                Arc::new(self.opener.open(ConnectionRole::Replica, &slave_config).await?)
            }
            None => Arc::clone(&master),
        };
        state.replica = Some(Arc::clone(&replica));

        info!(
            address = %master_config.address,
            database = %master_config.database_name,
            "[Store][database] connect the database successfully"
        );

        state.started = true;
        state.locks = Some(MySqlLockStore::new(Arc::clone(&master), Arc::clone(&replica)));
        state.alarm_rules = Some(MySqlAlarmRuleStore::new(master, replica));
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.started = false;
        state.locks = None;
        state.alarm_rules = None;

        let master = state.master.take();
        let master_tx = state.master_tx.take();
        let replica = state.replica.take();
        release_handles(master, master_tx, replica).await;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let conns = self.connections().await;
        if !conns.started {
            return Err(StoreError::not_started(STORE_NAME));
        }

        let aliased = conns.replica_aliases_master();
        let replica = conns.replica.filter(|_| !aliased);
        for handle in [conns.master, conns.master_tx, replica].into_iter().flatten() {
            handle.ping().await?;
            debug!(role = %handle.role(), "ping ok");
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for StableStore {
    async fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.locks().await?.try_lock(name, owner, ttl).await
    }

    async fn renew_lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.locks().await?.renew_lock(name, owner, ttl).await
    }

    async fn release_lock(&self, name: &str, owner: &str) -> Result<bool> {
        self.locks().await?.release_lock(name, owner).await
    }

    async fn get_lock(&self, name: &str) -> Result<Option<LockRecord>> {
        self.locks().await?.get_lock(name).await
    }
}

#[async_trait]
impl AlarmRuleStore for StableStore {
    async fn add_alarm_rule(&self, rule: &AlarmRule) -> Result<()> {
        self.alarm_rules().await?.add_alarm_rule(rule).await
    }

    async fn update_alarm_rule(&self, rule: &AlarmRule) -> Result<bool> {
        self.alarm_rules().await?.update_alarm_rule(rule).await
    }

    async fn delete_alarm_rules(&self, ids: &[String]) -> Result<u64> {
        self.alarm_rules().await?.delete_alarm_rules(ids).await
    }

    async fn enable_alarm_rules(&self, ids: &[String], enable: bool) -> Result<u64> {
        self.alarm_rules().await?.enable_alarm_rules(ids, enable).await
    }

    async fn get_alarm_rule(&self, id: &str) -> Result<Option<AlarmRule>> {
        self.alarm_rules().await?.get_alarm_rule(id).await
    }

    async fn list_alarm_rules(
        &self,
        filter: &AlarmRuleFilter,
        offset: u32,
        limit: u32,
    ) -> Result<(u64, Vec<AlarmRule>)> {
        self.alarm_rules()
            .await?
            .list_alarm_rules(filter, offset, limit)
            .await
    }
}
