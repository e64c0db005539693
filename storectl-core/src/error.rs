//! Structured error types for storectl-core.
//!
//! Uses `thiserror` so the bootstrap path can match on the failure class.
//! The CLI wraps these in `anyhow` for reporting.

use std::path::PathBuf;
use thiserror::Error;

use crate::handle::ConnectionRole;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A required top-level option (e.g. `master`) is absent
    #[error("config Plugin {store}: database {key} db config is missing")]
    MissingConfiguration { store: String, key: String },

    /// A required per-connection field is absent
    #[error("config Plugin {store}:{field} {reason}")]
    InvalidFieldConfiguration {
        store: String,
        field: String,
        reason: String,
    },

    /// The driver refused to build a connection handle
    #[error("failed to open {role} connection: {reason}")]
    ConnectionOpenFailure { role: ConnectionRole, reason: String },

    /// A store with the same name is already registered
    #[error("store name '{name}' is already registered")]
    DuplicateStoreName { name: String },

    /// No store registered under the requested name
    #[error("store '{name}' not found")]
    NotFound { name: String },

    /// A sub-store was used before `initialize` succeeded
    #[error("store '{name}' is not started")]
    NotStarted { name: String },

    /// `close` was called on a handle that is already closed
    #[error("{role} connection is already closed")]
    HandleClosed { role: ConnectionRole },

    /// Query failed in the driver
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the expected shape
    #[error("invalid config file {path:?}: {source}")]
    ConfigSyntax {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn missing_configuration(store: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            store: store.into(),
            key: key.into(),
        }
    }

    pub fn invalid_field(
        store: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldConfiguration {
            store: store.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn open_failure(role: ConnectionRole, reason: impl Into<String>) -> Self {
        Self::ConnectionOpenFailure {
            role,
            reason: reason.into(),
        }
    }

    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateStoreName { name: name.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn not_started(name: impl Into<String>) -> Self {
        Self::NotStarted { name: name.into() }
    }

    /// True for errors raised while validating configuration, before any
    /// connection was attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingConfiguration { .. }
                | Self::InvalidFieldConfiguration { .. }
                | Self::ConfigFile { .. }
                | Self::ConfigSyntax { .. }
        )
    }
}
