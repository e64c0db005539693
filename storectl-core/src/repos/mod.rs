//! Feature sub-stores sharing the stable store's connections
//!
//! Every sub-store is built with exactly two handles:
//! - `master` for writes and transactions
//! - `slave` for reads (the master handle itself when no replica is configured)

pub mod alarm_rule;
pub mod lock;

pub use alarm_rule::{
    AlarmCallback, AlarmRule, AlarmRuleFilter, AlarmRuleStore, AlterExpr, MySqlAlarmRuleStore,
};
pub use lock::{LockRecord, LockStore, MySqlLockStore, MAX_LOCK_TTL};
