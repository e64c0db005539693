//! Connection handles: one `sqlx` MySQL pool per database endpoint.
//!
//! Pools are built lazily, so opening a handle validates settings but does
//! not touch the network. The first query (or [`ConnectionHandle::ping`])
//! establishes a connection.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{Executor, Transaction};
use tracing::debug;

use crate::config::ConnectionDescriptor;
use crate::error::{Result, StoreError};

/// The only driver kind this store speaks.
pub const MYSQL_DRIVER: &str = "mysql";

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Which slot of the stable store a handle fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// Writable primary
    Master,
    /// Second primary pool reserved for transactions
    MasterTx,
    /// Read replica
    Replica,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionRole::Master => "master",
            ConnectionRole::MasterTx => "master-tx",
            ConnectionRole::Replica => "replica",
        };
        f.write_str(label)
    }
}

/// Transaction isolation levels, numbered as in the console config
/// (`txIsolationLevel`). Levels without a MySQL equivalent are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Map a configured level number. `Err` carries the unsupported number.
    pub fn from_level(level: u32) -> std::result::Result<Self, u32> {
        match level {
            1 => Ok(Self::ReadUncommitted),
            2 => Ok(Self::ReadCommitted),
            4 => Ok(Self::RepeatableRead),
            6 => Ok(Self::Serializable),
            other => Err(other),
        }
    }

    pub fn set_session_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "SET SESSION TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// A pooled connection to one database endpoint.
///
/// Cloning the inner pool is cheap; the stable store shares handles through
/// `Arc` and is the only party that closes them.
pub struct ConnectionHandle {
    role: ConnectionRole,
    descriptor: ConnectionDescriptor,
    pool: MySqlPool,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("role", &self.role)
            .field("descriptor", &self.descriptor)
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    /// Build a lazy pool from a descriptor.
    ///
    /// Must be called inside a Tokio runtime: the pool spawns its
    /// maintenance task on creation.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionOpenFailure` for a non-MySQL driver kind, an
    /// unparsable address, or an isolation level MySQL does not support.
    pub fn open(role: ConnectionRole, descriptor: &ConnectionDescriptor) -> Result<Self> {
        if !descriptor.driver_kind.eq_ignore_ascii_case(MYSQL_DRIVER) {
            return Err(StoreError::open_failure(
                role,
                format!("unsupported driver kind '{}'", descriptor.driver_kind),
            ));
        }

        let (host, port) =
            split_address(&descriptor.address).map_err(|reason| StoreError::open_failure(role, reason))?;

        let isolation = descriptor
            .tx_isolation_level
            .map(IsolationLevel::from_level)
            .transpose()
            .map_err(|level| {
                StoreError::open_failure(role, format!("unsupported isolation level {level}"))
            })?;

        let connect_options = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&descriptor.user)
            .password(&descriptor.password)
            .database(&descriptor.database_name);

        let mut pool_options = MySqlPoolOptions::new()
            .max_lifetime(Duration::from_secs(descriptor.conn_max_lifetime_secs));
        if let Some(max_open) = descriptor.max_open_connections {
            pool_options = pool_options.max_connections(max_open);
        }
        if let Some(max_idle) = descriptor.max_idle_connections {
            // sqlx reaps idle connections by timeout rather than by count.
            debug!(%role, max_idle, "maxIdleConns recorded but not enforced by the pool");
        }
        if let Some(level) = isolation {
            let sql = level.set_session_sql();
            pool_options = pool_options.after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(sql).await?;
                    Ok(())
                })
            });
        }

        let pool = pool_options.connect_lazy_with(connect_options);
        debug!(%role, host = %host, port, database = %descriptor.database_name, "connection pool created");

        Ok(Self {
            role,
            descriptor: descriptor.clone(),
            pool,
        })
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Underlying pool, for sub-stores issuing queries.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Round-trip a trivial query to prove the endpoint is reachable.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Begin a transaction on this handle's pool.
    pub async fn begin(&self) -> Result<Transaction<'static, MySql>> {
        Ok(self.pool.begin().await?)
    }

    /// Close the pool, waiting for checked-out connections to return.
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the handle was already closed.
    pub async fn close(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(StoreError::HandleClosed { role: self.role });
        }
        self.pool.close().await;
        Ok(())
    }
}

/// Builds connection handles for the stable store.
///
/// The bootstrap path can swap in its own opener (e.g. one that verifies
/// connectivity eagerly, or one that counts opens in tests).
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    async fn open(
        &self,
        role: ConnectionRole,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ConnectionHandle>;
}

/// Default opener: lazy MySQL pools.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlOpener;

#[async_trait]
impl ConnectionOpener for MySqlOpener {
    async fn open(
        &self,
        role: ConnectionRole,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ConnectionHandle> {
        ConnectionHandle::open(role, descriptor)
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 hosts (`[::1]:3306`).
pub fn split_address(address: &str) -> std::result::Result<(String, u16), String> {
    let address = address.trim();
    if address.is_empty() {
        return Err("empty address".to_string());
    }

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| format!("unterminated IPv6 address '{address}'"))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(address, port)?,
            None if tail.is_empty() => DEFAULT_MYSQL_PORT,
            None => return Err(format!("invalid address '{address}'")),
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => {
            Err(format!("IPv6 address '{address}' must be bracketed"))
        }
        Some((host, _)) if host.is_empty() => Err(format!("missing host in '{address}'")),
        Some((host, port)) => Ok((host.to_string(), parse_port(address, port)?)),
        None => Ok((address.to_string(), DEFAULT_MYSQL_PORT)),
    }
}

fn parse_port(address: &str, port: &str) -> std::result::Result<u16, String> {
    port.parse::<u16>()
        .map_err(|_| format!("invalid port '{port}' in address '{address}'"))
}
