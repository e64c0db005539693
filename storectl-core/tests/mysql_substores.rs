//! Sub-store tests against a real MySQL server.
//!
//! Run with:
//!   STORECTL_TEST_MYSQL_ADDR=127.0.0.1:3306 STORECTL_TEST_MYSQL_PWD=... \
//!   cargo test -p storectl-core --test mysql_substores -- --ignored

use std::collections::BTreeMap;
use std::time::Duration;

use storectl_core::{
    AlarmCallback, AlarmRule, AlarmRuleFilter, AlarmRuleStore, AlterExpr, LockStore, StableStore,
    Store, StoreConfig,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS t_lock (
        name VARCHAR(128) NOT NULL PRIMARY KEY,
        owner VARCHAR(128) NOT NULL,
        version BIGINT UNSIGNED NOT NULL,
        expire_time DATETIME NOT NULL,
        modify_time DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_alarm_rule (
        id VARCHAR(128) NOT NULL PRIMARY KEY,
        name VARCHAR(64) NOT NULL,
        enable TINYINT(1) NOT NULL DEFAULT 0,
        monitor_type VARCHAR(64) NOT NULL,
        alter_expr TEXT NOT NULL,
        report_interval INT UNSIGNED NOT NULL,
        topic VARCHAR(128) NOT NULL,
        message TEXT NOT NULL,
        callback TEXT NOT NULL,
        revision VARCHAR(64) NOT NULL,
        flag TINYINT(1) NOT NULL DEFAULT 0,
        ctime DATETIME NULL,
        mtime DATETIME NULL,
        etime DATETIME NULL
    )
    "#,
];

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

async fn started_store() -> StableStore {
    let addr = std::env::var("STORECTL_TEST_MYSQL_ADDR").expect("STORECTL_TEST_MYSQL_ADDR required");
    let yaml = format!(
        r#"
name: defaultStore
option:
  master:
    dbType: mysql
    dbUser: {user}
    dbPwd: "{pwd}"
    dbAddr: {addr}
    dbName: {db}
"#,
        user = env_or("STORECTL_TEST_MYSQL_USER", "root"),
        pwd = env_or("STORECTL_TEST_MYSQL_PWD", ""),
        db = env_or("STORECTL_TEST_MYSQL_DB", "storectl_test"),
    );
    let config: StoreConfig = serde_yaml::from_str(&yaml).unwrap();

    let store = StableStore::new();
    store.initialize(&config).await.expect("initialize failed");

    let master = store.connections().await.master.unwrap();
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(master.pool()).await.expect("schema failed");
    }
    store
}

fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn rule(id: &str, name: &str) -> AlarmRule {
    AlarmRule {
        id: id.to_string(),
        name: name.to_string(),
        enable: false,
        monitor_type: "service".to_string(),
        alter_expr: AlterExpr {
            metrics_name: "cpu_usage".to_string(),
            metric_filter: BTreeMap::from([("namespace".to_string(), "Polaris".to_string())]),
            value: 0.9,
            operator: ">".to_string(),
            for_duration: 5,
            for_unit: "m".to_string(),
        },
        report_interval: 300,
        topic: "ops".to_string(),
        message: "cpu above threshold".to_string(),
        callback: AlarmCallback {
            kind: "webhook".to_string(),
            info: BTreeMap::from([("url".to_string(), "http://hook.local".to_string())]),
        },
        revision: "r1".to_string(),
        create_time: None,
        modify_time: None,
        enable_time: None,
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn lock_lifecycle() {
    let store = started_store().await;
    let name = unique("lock");
    let ttl = Duration::from_secs(30);

    assert!(store.try_lock(&name, "node-a", ttl).await.unwrap());
    // Held by node-a
    assert!(!store.try_lock(&name, "node-b", ttl).await.unwrap());
    // Re-entrant for the holder
    assert!(store.try_lock(&name, "node-a", ttl).await.unwrap());

    let record = store.get_lock(&name).await.unwrap().unwrap();
    assert_eq!(record.owner, "node-a");
    assert_eq!(record.version, 2);

    assert!(store.renew_lock(&name, "node-a", ttl).await.unwrap());
    assert!(!store.renew_lock(&name, "node-b", ttl).await.unwrap());

    assert!(!store.release_lock(&name, "node-b").await.unwrap());
    assert!(store.release_lock(&name, "node-a").await.unwrap());
    assert!(store.get_lock(&name).await.unwrap().is_none());

    assert!(store.try_lock(&name, "node-b", ttl).await.unwrap());
    store.release_lock(&name, "node-b").await.unwrap();
    store.destroy().await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn expired_lock_changes_hands() {
    let store = started_store().await;
    let name = unique("lease");

    assert!(store.try_lock(&name, "node-a", Duration::ZERO).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(store.try_lock(&name, "node-b", Duration::from_secs(30)).await.unwrap());

    let record = store.get_lock(&name).await.unwrap().unwrap();
    assert_eq!(record.owner, "node-b");

    store.release_lock(&name, "node-b").await.unwrap();
    store.destroy().await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn alarm_rule_crud() {
    let store = started_store().await;
    let prefix = unique("rule");
    let first = rule(&format!("{prefix}-1"), &format!("{prefix}-cpu"));
    let second = rule(&format!("{prefix}-2"), &format!("{prefix}-mem"));

    store.add_alarm_rule(&first).await.unwrap();
    store.add_alarm_rule(&second).await.unwrap();

    let fetched = store.get_alarm_rule(&first.id).await.unwrap().unwrap();
    assert_eq!(fetched.alter_expr, first.alter_expr);
    assert_eq!(fetched.callback, first.callback);
    assert!(fetched.create_time.is_some());

    let filter = AlarmRuleFilter {
        name: Some(format!("{prefix}*")),
        ..Default::default()
    };
    let (total, rules) = store.list_alarm_rules(&filter, 0, 10).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(rules.len(), 2);

    let mut updated = first.clone();
    updated.message = "updated".to_string();
    assert!(store.update_alarm_rule(&updated).await.unwrap());

    let ids = vec![first.id.clone(), second.id.clone()];
    assert_eq!(store.enable_alarm_rules(&ids, true).await.unwrap(), 2);
    let enabled = AlarmRuleFilter {
        name: Some(format!("{prefix}*")),
        enable: Some(true),
        ..Default::default()
    };
    assert_eq!(store.list_alarm_rules(&enabled, 0, 10).await.unwrap().0, 2);

    assert_eq!(store.delete_alarm_rules(&ids).await.unwrap(), 2);
    assert!(store.get_alarm_rule(&first.id).await.unwrap().is_none());
    assert!(!store.update_alarm_rule(&updated).await.unwrap());

    store.destroy().await.unwrap();
}
