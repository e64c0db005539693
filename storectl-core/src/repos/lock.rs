//! Lock store - named leases shared between console instances
//!
//! - acquire: SELECT ... FOR UPDATE inside a master transaction
//! - renew/release: conditional UPDATE/DELETE keyed on (name, owner)
//! - reads go through the replica handle

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::handle::ConnectionHandle;

/// Upper bound on a single lease; longer requests are clamped.
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lock row from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct LockRecord {
    pub name: String,
    pub owner: String,
    pub version: u64,
    pub expire_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_time <= now
    }

    /// Whether `owner` may take this lock at `now`.
    pub fn can_acquire(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.owner == owner || self.is_expired_at(now)
    }
}

/// Named lease operations.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Acquire `name` for `owner`. Succeeds when the lock is free, expired,
    /// or already held by `owner`; bumps the version on success.
    async fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Extend a lease still held by `owner`.
    async fn renew_lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Drop a lease held by `owner`.
    async fn release_lock(&self, name: &str, owner: &str) -> Result<bool>;

    async fn get_lock(&self, name: &str) -> Result<Option<LockRecord>>;
}

/// MySQL-backed lock store
#[derive(Debug, Clone)]
pub struct MySqlLockStore {
    master: Arc<ConnectionHandle>,
    slave: Arc<ConnectionHandle>,
}

impl MySqlLockStore {
    pub fn new(master: Arc<ConnectionHandle>, slave: Arc<ConnectionHandle>) -> Self {
        Self { master, slave }
    }
}

pub(crate) fn lease_deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let secs = ttl.min(MAX_LOCK_TTL).as_secs();
    now + chrono::Duration::seconds(secs as i64)
}

#[async_trait]
impl LockStore for MySqlLockStore {
    async fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut tx = self.master.begin().await?;
        let now = Utc::now();
        let expire_time = lease_deadline(now, ttl);

        let current = sqlx::query_as::<_, LockRecord>(
            r#"
            SELECT name, owner, version, expire_time, modify_time
            FROM t_lock
            WHERE name = ?
            FOR UPDATE
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

        match current {
            None => {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO t_lock (name, owner, version, expire_time, modify_time)
                    VALUES (?, ?, 1, ?, ?)
                    "#,
                )
                .bind(name)
                .bind(owner)
                .bind(expire_time)
                .bind(now)
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => {}
                    // Another instance inserted the row first
                    Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                        tx.rollback().await?;
                        return Ok(false);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Some(record) if record.can_acquire(owner, now) => {
                sqlx::query(
                    r#"
                    UPDATE t_lock
                    SET owner = ?, version = version + 1, expire_time = ?, modify_time = ?
                    WHERE name = ?
                    "#,
                )
                .bind(owner)
                .bind(expire_time)
                .bind(now)
                .bind(name)
                .execute(&mut *tx)
                .await?;
            }
            Some(record) => {
                debug!(lock = name, holder = %record.owner, "lock held by another owner");
                tx.rollback().await?;
                return Ok(false);
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn renew_lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE t_lock
            SET expire_time = ?, modify_time = ?
            WHERE name = ? AND owner = ? AND expire_time > ?
            "#,
        )
        .bind(lease_deadline(now, ttl))
        .bind(now)
        .bind(name)
        .bind(owner)
        .bind(now)
        .execute(self.master.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lock(&self, name: &str, owner: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM t_lock WHERE name = ? AND owner = ?")
            .bind(name)
            .bind(owner)
            .execute(self.master.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_lock(&self, name: &str) -> Result<Option<LockRecord>> {
        sqlx::query_as::<_, LockRecord>(
            r#"
            SELECT name, owner, version, expire_time, modify_time
            FROM t_lock
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(self.slave.pool())
        .await
        .map_err(StoreError::from)
    }
}
