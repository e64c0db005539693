//! Alarm rule store
//!
//! Rules are soft-deleted (`flag = 1`) so history survives. The alert
//! expression and callback are stored as JSON text columns.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySql;
use sqlx::{FromRow, QueryBuilder};

use crate::error::{Result, StoreError};
use crate::handle::ConnectionHandle;

const RULE_COLUMNS: &str = "id, name, enable, monitor_type, alter_expr, report_interval, \
     topic, message, callback, revision, ctime, mtime, etime";

/// Threshold expression evaluated against a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterExpr {
    pub metrics_name: String,
    #[serde(default)]
    pub metric_filter: BTreeMap<String, String>,
    pub value: f64,
    /// Comparison operator, e.g. `>`, `>=`, `==`
    pub operator: String,
    #[serde(default)]
    pub for_duration: u32,
    #[serde(default)]
    pub for_unit: String,
}

/// Where a fired alarm is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmCallback {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: String,
    pub name: String,
    pub enable: bool,
    pub monitor_type: String,
    pub alter_expr: AlterExpr,
    /// Seconds between repeated reports of a firing alarm
    pub report_interval: u32,
    pub topic: String,
    pub message: String,
    pub callback: AlarmCallback,
    pub revision: String,
    pub create_time: Option<DateTime<Utc>>,
    pub modify_time: Option<DateTime<Utc>>,
    pub enable_time: Option<DateTime<Utc>>,
}

/// Raw row; JSON columns still encoded.
#[derive(Debug, FromRow)]
struct AlarmRuleRow {
    id: String,
    name: String,
    enable: bool,
    monitor_type: String,
    alter_expr: String,
    report_interval: u32,
    topic: String,
    message: String,
    callback: String,
    revision: String,
    ctime: Option<DateTime<Utc>>,
    mtime: Option<DateTime<Utc>>,
    etime: Option<DateTime<Utc>>,
}

impl TryFrom<AlarmRuleRow> for AlarmRule {
    type Error = StoreError;

    fn try_from(row: AlarmRuleRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            enable: row.enable,
            monitor_type: row.monitor_type,
            alter_expr: serde_json::from_str(&row.alter_expr)?,
            report_interval: row.report_interval,
            topic: row.topic,
            message: row.message,
            callback: serde_json::from_str(&row.callback)?,
            revision: row.revision,
            create_time: row.ctime,
            modify_time: row.mtime,
            enable_time: row.etime,
        })
    }
}

/// Search filter for [`AlarmRuleStore::list_alarm_rules`].
///
/// `name` ending in `*` is a prefix match; otherwise all fields match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmRuleFilter {
    pub id: Option<String>,
    pub name: Option<String>,
    pub enable: Option<bool>,
    pub monitor_type: Option<String>,
}

impl AlarmRuleFilter {
    /// Append `AND ...` conditions for every set field.
    pub fn push_conditions(&self, builder: &mut QueryBuilder<'_, MySql>) {
        if let Some(id) = &self.id {
            builder.push(" AND id = ");
            builder.push_bind(id.clone());
        }
        if let Some(name) = &self.name {
            match name.strip_suffix('*') {
                Some(prefix) => {
                    builder.push(" AND name LIKE ");
                    builder.push_bind(format!("{}%", escape_like(prefix)));
                }
                None => {
                    builder.push(" AND name = ");
                    builder.push_bind(name.clone());
                }
            }
        }
        if let Some(enable) = self.enable {
            builder.push(" AND enable = ");
            builder.push_bind(enable);
        }
        if let Some(monitor_type) = &self.monitor_type {
            builder.push(" AND monitor_type = ");
            builder.push_bind(monitor_type.clone());
        }
    }
}

/// Escape LIKE wildcards so a prefix matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
pub trait AlarmRuleStore: Send + Sync {
    async fn add_alarm_rule(&self, rule: &AlarmRule) -> Result<()>;

    /// Returns false when no live rule has this id.
    async fn update_alarm_rule(&self, rule: &AlarmRule) -> Result<bool>;

    /// Soft-delete; returns the number of rules removed.
    async fn delete_alarm_rules(&self, ids: &[String]) -> Result<u64>;

    async fn enable_alarm_rules(&self, ids: &[String], enable: bool) -> Result<u64>;

    async fn get_alarm_rule(&self, id: &str) -> Result<Option<AlarmRule>>;

    /// Returns the total match count and one page of rules, newest first.
    async fn list_alarm_rules(
        &self,
        filter: &AlarmRuleFilter,
        offset: u32,
        limit: u32,
    ) -> Result<(u64, Vec<AlarmRule>)>;
}

/// MySQL-backed alarm rule store
#[derive(Debug, Clone)]
pub struct MySqlAlarmRuleStore {
    master: Arc<ConnectionHandle>,
    slave: Arc<ConnectionHandle>,
}

impl MySqlAlarmRuleStore {
    pub fn new(master: Arc<ConnectionHandle>, slave: Arc<ConnectionHandle>) -> Self {
        Self { master, slave }
    }
}

fn list_query(filter: &AlarmRuleFilter, offset: u32, limit: u32) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new(format!("SELECT {RULE_COLUMNS} FROM t_alarm_rule WHERE flag = 0"));
    filter.push_conditions(&mut builder);
    builder.push(" ORDER BY mtime DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    builder
}

fn count_query(filter: &AlarmRuleFilter) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM t_alarm_rule WHERE flag = 0");
    filter.push_conditions(&mut builder);
    builder
}

/// `UPDATE t_alarm_rule SET <assignments> WHERE flag = 0 AND id IN (...)`
fn update_by_ids<'a>(assignments: &str, ids: &'a [String]) -> QueryBuilder<'a, MySql> {
    let mut builder = QueryBuilder::new(format!("UPDATE t_alarm_rule SET {assignments}"));
    builder.push(" WHERE flag = 0 AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
    builder
}

#[async_trait]
impl AlarmRuleStore for MySqlAlarmRuleStore {
    async fn add_alarm_rule(&self, rule: &AlarmRule) -> Result<()> {
        let now = Utc::now();
        let enable_time = rule.enable.then_some(now);

        sqlx::query(
            r#"
            INSERT INTO t_alarm_rule
                (id, name, enable, monitor_type, alter_expr, report_interval,
                 topic, message, callback, revision, flag, ctime, mtime, etime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(rule.enable)
        .bind(&rule.monitor_type)
        .bind(serde_json::to_string(&rule.alter_expr)?)
        .bind(rule.report_interval)
        .bind(&rule.topic)
        .bind(&rule.message)
        .bind(serde_json::to_string(&rule.callback)?)
        .bind(&rule.revision)
        .bind(now)
        .bind(now)
        .bind(enable_time)
        .execute(self.master.pool())
        .await?;

        Ok(())
    }

    async fn update_alarm_rule(&self, rule: &AlarmRule) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE t_alarm_rule
            SET name = ?, monitor_type = ?, alter_expr = ?, report_interval = ?,
                topic = ?, message = ?, callback = ?, revision = ?, mtime = ?
            WHERE id = ? AND flag = 0
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.monitor_type)
        .bind(serde_json::to_string(&rule.alter_expr)?)
        .bind(rule.report_interval)
        .bind(&rule.topic)
        .bind(&rule.message)
        .bind(serde_json::to_string(&rule.callback)?)
        .bind(&rule.revision)
        .bind(Utc::now())
        .bind(&rule.id)
        .execute(self.master.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_alarm_rules(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = update_by_ids("flag = 1, mtime = NOW()", ids)
            .build()
            .execute(self.master.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn enable_alarm_rules(&self, ids: &[String], enable: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let assignments = if enable {
            "enable = 1, etime = NOW(), mtime = NOW()"
        } else {
            "enable = 0, etime = NULL, mtime = NOW()"
        };
        let result = update_by_ids(assignments, ids)
            .build()
            .execute(self.master.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_alarm_rule(&self, id: &str) -> Result<Option<AlarmRule>> {
        let row = sqlx::query_as::<_, AlarmRuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM t_alarm_rule WHERE id = ? AND flag = 0"
        ))
        .bind(id)
        .fetch_optional(self.slave.pool())
        .await?;

        row.map(AlarmRule::try_from).transpose()
    }

    async fn list_alarm_rules(
        &self,
        filter: &AlarmRuleFilter,
        offset: u32,
        limit: u32,
    ) -> Result<(u64, Vec<AlarmRule>)> {
        let total: i64 = count_query(filter)
            .build_query_scalar()
            .fetch_one(self.slave.pool())
            .await?;

        let rows: Vec<AlarmRuleRow> = list_query(filter, offset, limit)
            .build_query_as()
            .fetch_all(self.slave.pool())
            .await?;

        let rules = rows
            .into_iter()
            .map(AlarmRule::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((u64::try_from(total).unwrap_or_default(), rules))
    }
}
