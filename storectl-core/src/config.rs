//! Store configuration: the console config file and the permissive
//! per-connection parser.
//!
//! Connection options arrive as loose YAML values. Required fields are only
//! checked for presence and then stringified, so `dbPwd: 1234` is accepted
//! as the password `"1234"`. Optional pool settings apply only when they are
//! positive integers.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Default maximum connection lifetime in seconds (30 minutes).
pub const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 60 * 30;

/// Top-level option key holding the writable primary.
pub const MASTER_KEY: &str = "master";
/// Top-level option key holding the optional read replica.
pub const SLAVE_KEY: &str = "slave";

/// Console configuration file (YAML).
///
/// ```yaml
/// logger:
///   level: info
/// store:
///   name: defaultStore
///   option:
///     master:
///       dbType: mysql
///       dbUser: root
///       dbPwd: polaris
///       dbAddr: 127.0.0.1:3306
///       dbName: polaris_server
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub logger: LoggerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggerConfig {
    /// Default log filter when `RUST_LOG` is not set
    pub level: Option<String>,
}

/// Selects a registered store and carries its loosely-typed options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    pub name: String,
    #[serde(default)]
    pub option: HashMap<String, Value>,
}

impl ConsoleConfig {
    /// Load a console config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| StoreError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_str(&content).map_err(|source| StoreError::ConfigSyntax {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

/// Validated connection settings for one database endpoint.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    pub driver_kind: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub address: String,
    pub database_name: String,
    /// None leaves the driver default in place
    pub max_open_connections: Option<u32>,
    pub max_idle_connections: Option<u32>,
    pub conn_max_lifetime_secs: u64,
    /// None means driver default (configured as 0 or absent)
    pub tx_isolation_level: Option<u32>,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("driver_kind", &self.driver_kind)
            .field("user", &self.user)
            .field("password", &"***")
            .field("address", &self.address)
            .field("database_name", &self.database_name)
            .field("max_open_connections", &self.max_open_connections)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("conn_max_lifetime_secs", &self.conn_max_lifetime_secs)
            .field("tx_isolation_level", &self.tx_isolation_level)
            .finish()
    }
}

/// Parse the `master` and optional `slave` sections of a store's options.
///
/// Returns the replica descriptor as `None` when `slave` is absent or null.
pub fn parse_database_config(
    store: &str,
    options: &HashMap<String, Value>,
) -> Result<(ConnectionDescriptor, Option<ConnectionDescriptor>)> {
    let master_entry = match options.get(MASTER_KEY) {
        Some(value) if !value.is_null() => value,
        _ => return Err(StoreError::missing_configuration(store, MASTER_KEY)),
    };
    let master = parse_store_config(store, master_entry)?;

    let slave = match options.get(SLAVE_KEY) {
        Some(value) if !value.is_null() => Some(parse_store_config(store, value)?),
        _ => None,
    };

    Ok((master, slave))
}

/// Parse one connection section into a [`ConnectionDescriptor`].
///
/// A section that is not a mapping behaves like an empty one and fails on
/// the first required field.
pub fn parse_store_config(store: &str, raw: &Value) -> Result<ConnectionDescriptor> {
    let empty = serde_yaml::Mapping::new();
    let obj = raw.as_mapping().unwrap_or(&empty);

    // Field initializers run in order, so dbType is checked first.
    Ok(ConnectionDescriptor {
        driver_kind: required_field(store, obj, "dbType")?,
        user: required_field(store, obj, "dbUser")?,
        password: required_field(store, obj, "dbPwd")?,
        address: required_field(store, obj, "dbAddr")?,
        database_name: required_field(store, obj, "dbName")?,
        max_open_connections: positive_u32(obj, "maxOpenConns"),
        max_idle_connections: positive_u32(obj, "maxIdleConns"),
        conn_max_lifetime_secs: positive_int(obj, "connMaxLifetime")
            .and_then(|secs| u64::try_from(secs).ok())
            .unwrap_or(DEFAULT_CONN_MAX_LIFETIME_SECS),
        tx_isolation_level: positive_u32(obj, "txIsolationLevel"),
    })
}

/// Stringify any config value.
///
/// Scalars use their plain form. Null renders as `<nil>`, sequences as
/// `[a b]` and mappings as `map[k:v]` with keys sorted.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Tagged(tagged) => coerce_to_string(&tagged.value),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(coerce_to_string).collect();
            format!("[{}]", items.join(" "))
        }
        Value::Mapping(map) => {
            let mut pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", coerce_to_string(k), coerce_to_string(v)))
                .collect();
            pairs.sort();
            format!("map[{}]", pairs.join(" "))
        }
    }
}

/// Only an absent key is an error; any present value is stringified.
fn required_field(store: &str, obj: &serde_yaml::Mapping, field: &str) -> Result<String> {
    obj.get(field)
        .map(coerce_to_string)
        .ok_or_else(|| StoreError::invalid_field(store, field, "is missing"))
}

fn positive_int(obj: &serde_yaml::Mapping, key: &str) -> Option<i64> {
    let value = obj.get(key)?;
    match value.as_i64() {
        Some(n) if n > 0 => Some(n),
        _ => {
            debug!(key, ?value, "ignoring non-positive or non-integer option");
            None
        }
    }
}

fn positive_u32(obj: &serde_yaml::Mapping, key: &str) -> Option<u32> {
    positive_int(obj, key).and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = "defaultStore";
    const REQUIRED_FIELDS: [&str; 5] = ["dbType", "dbUser", "dbPwd", "dbAddr", "dbName"];

    fn options(yaml: &str) -> HashMap<String, Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    const MASTER_ONLY: &str = r#"
master:
  dbType: mysql
  dbUser: u
  dbPwd: p
  dbAddr: 127.0.0.1:3306
  dbName: polaris
"#;

    #[test]
    fn master_only_has_no_replica() {
        let (master, slave) = parse_database_config(STORE, &options(MASTER_ONLY)).unwrap();

        assert_eq!(master.driver_kind, "mysql");
        assert_eq!(master.user, "u");
        assert_eq!(master.password, "p");
        assert_eq!(master.address, "127.0.0.1:3306");
        assert_eq!(master.database_name, "polaris");
        assert!(slave.is_none());
    }

    #[test]
    fn defaults_when_optional_fields_absent() {
        let (master, _) = parse_database_config(STORE, &options(MASTER_ONLY)).unwrap();

        assert_eq!(master.max_open_connections, None);
        assert_eq!(master.max_idle_connections, None);
        assert_eq!(master.conn_max_lifetime_secs, DEFAULT_CONN_MAX_LIFETIME_SECS);
        assert_eq!(master.conn_max_lifetime_secs, 1800);
        assert_eq!(master.tx_isolation_level, None);
    }

    #[test]
    fn non_positive_optional_fields_fall_back() {
        let opts = options(
            r#"
master:
  dbType: mysql
  dbUser: u
  dbPwd: p
  dbAddr: db:3306
  dbName: polaris
  maxOpenConns: 0
  maxIdleConns: -4
  connMaxLifetime: -1
  txIsolationLevel: 0
"#,
        );
        let (master, _) = parse_database_config(STORE, &opts).unwrap();

        assert_eq!(master.max_open_connections, None);
        assert_eq!(master.max_idle_connections, None);
        assert_eq!(master.conn_max_lifetime_secs, 1800);
        assert_eq!(master.tx_isolation_level, None);
    }

    #[test]
    fn positive_optional_fields_apply() {
        let opts = options(
            r#"
master:
  dbType: mysql
  dbUser: u
  dbPwd: p
  dbAddr: db:3306
  dbName: polaris
  maxOpenConns: 50
  maxIdleConns: 10
  connMaxLifetime: 300
  txIsolationLevel: 2
"#,
        );
        let (master, _) = parse_database_config(STORE, &opts).unwrap();

        assert_eq!(master.max_open_connections, Some(50));
        assert_eq!(master.max_idle_connections, Some(10));
        assert_eq!(master.conn_max_lifetime_secs, 300);
        assert_eq!(master.tx_isolation_level, Some(2));
    }

    #[test]
    fn string_numbers_in_optional_fields_are_ignored() {
        let opts = options(
            r#"
master:
  dbType: mysql
  dbUser: u
  dbPwd: p
  dbAddr: db:3306
  dbName: polaris
  maxOpenConns: "50"
"#,
        );
        let (master, _) = parse_database_config(STORE, &opts).unwrap();
        assert_eq!(master.max_open_connections, None);
    }

    #[test]
    fn missing_master_is_reported() {
        let err = parse_database_config(STORE, &HashMap::new()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingConfiguration { ref store, ref key } if store == STORE && key == "master"
        ));
    }

    #[test]
    fn null_master_is_reported() {
        let err = parse_database_config(STORE, &options("master: ~\n")).unwrap_err();
        assert!(matches!(err, StoreError::MissingConfiguration { .. }));
    }

    #[test]
    fn each_required_field_is_checked() {
        for missing in REQUIRED_FIELDS {
            let mut section = serde_yaml::Mapping::new();
            for field in REQUIRED_FIELDS {
                if field != missing {
                    section.insert(Value::from(field), Value::from("x"));
                }
            }

            let err = parse_store_config(STORE, &Value::Mapping(section)).unwrap_err();
            match err {
                StoreError::InvalidFieldConfiguration { store, field, .. } => {
                    assert_eq!(store, STORE);
                    assert_eq!(field, missing);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn scalars_are_stringified() {
        let raw: Value = serde_yaml::from_str(
            r#"
dbType: mysql
dbUser: 42
dbPwd: true
dbAddr: 10.0.0.1:3306
dbName: 3.5
"#,
        )
        .unwrap();
        let desc = parse_store_config(STORE, &raw).unwrap();

        assert_eq!(desc.user, "42");
        assert_eq!(desc.password, "true");
        assert_eq!(desc.database_name, "3.5");
    }

    #[test]
    fn compound_and_null_values_are_stringified() {
        let raw: Value = serde_yaml::from_str(
            r#"
dbType: mysql
dbUser: [a, b]
dbPwd: ~
dbAddr: {port: 3306, host: db}
dbName: polaris
"#,
        )
        .unwrap();
        let desc = parse_store_config(STORE, &raw).unwrap();

        assert_eq!(desc.user, "[a b]");
        assert_eq!(desc.password, "<nil>");
        assert_eq!(desc.address, "map[host:db port:3306]");
    }

    #[test]
    fn non_mapping_section_fails_on_first_field() {
        let err = parse_store_config(STORE, &Value::from("mysql://nope")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidFieldConfiguration { ref field, .. } if field == "dbType"
        ));
    }

    #[test]
    fn slave_is_parsed_when_present() {
        let opts = options(
            r#"
master:
  dbType: mysql
  dbUser: u
  dbPwd: p
  dbAddr: primary:3306
  dbName: polaris
slave:
  dbType: mysql
  dbUser: ro
  dbPwd: p
  dbAddr: replica:3306
  dbName: polaris
"#,
        );
        let (master, slave) = parse_database_config(STORE, &opts).unwrap();
        let slave = slave.unwrap();

        assert_eq!(master.address, "primary:3306");
        assert_eq!(slave.address, "replica:3306");
        assert_eq!(slave.user, "ro");
    }

    #[test]
    fn null_slave_is_treated_as_absent() {
        let yaml = format!("{MASTER_ONLY}slave: ~\n");
        let (_, slave) = parse_database_config(STORE, &options(&yaml)).unwrap();
        assert!(slave.is_none());
    }

    #[test]
    fn invalid_slave_fails_whole_parse() {
        let yaml = format!("{MASTER_ONLY}slave:\n  dbType: mysql\n");
        let err = parse_database_config(STORE, &options(&yaml)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidFieldConfiguration { ref field, .. } if field == "dbUser"
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let (master, _) = parse_database_config(STORE, &options(MASTER_ONLY)).unwrap();
        let rendered = format!("{master:?}");
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("password: \"p\""));

        let json = serde_json::to_string(&master).unwrap();
        assert!(!json.contains("password"));
    }

    #[test]
    fn console_config_from_yaml() {
        let config = ConsoleConfig::from_yaml_str(
            r#"
logger:
  level: debug
store:
  name: defaultStore
  option:
    master:
      dbType: mysql
      dbUser: u
      dbPwd: p
      dbAddr: 127.0.0.1:3306
      dbName: polaris
"#,
        )
        .unwrap();

        assert_eq!(config.logger.level.as_deref(), Some("debug"));
        assert_eq!(config.store.name, "defaultStore");
        assert!(config.store.option.contains_key("master"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ConsoleConfig::load("/nonexistent/storectl/console.yaml").unwrap_err();
        assert!(matches!(err, StoreError::ConfigFile { .. }));
    }

    #[test]
    fn load_reports_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.yaml");
        fs::write(&path, "store: [not, a, mapping]\n").unwrap();

        let err = ConsoleConfig::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::ConfigSyntax { .. }));
    }
}
