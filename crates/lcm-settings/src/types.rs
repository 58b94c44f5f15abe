//! Settings type definitions.
//!
//! Field names are camelCase on the wire. Every struct is `#[serde(default)]`
//! so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::loader::openclaw_dir;

/// Root settings for the ledger tools.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSettings {
    /// Ledger database connection.
    pub database: DatabaseSettings,
    /// Diagnostic output.
    pub logging: LoggingSettings,
}

/// Where the ledger lives and how connections behave.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Path to the `SQLite` ledger shared with the agent runtime.
    pub path: String,
    /// How long a writer waits on a locked database.
    pub busy_timeout_ms: u32,
    /// Maximum pooled connections.
    pub pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: openclaw_dir().join("lcm.db").to_string_lossy().into_owned(),
            busy_timeout_ms: 5000,
            pool_size: 4,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
