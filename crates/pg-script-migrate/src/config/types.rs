//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
///
/// Either database may be absent: `export` only needs a source and `replay`
/// only needs a target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database the scripts are extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DatabaseConfig>,

    /// Database the scripts are replayed against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DatabaseConfig>,

    /// Export behavior.
    #[serde(default)]
    pub export: ExportConfig,

    /// Replay behavior.
    #[serde(default)]
    pub replay: ReplayConfig,

    /// External dump/restore tools for direct migration.
    #[serde(default)]
    pub dump: DumpConfig,
}

/// PostgreSQL connection settings.
///
/// `url` accepts any libpq-style connection string (`postgres://...` or
/// `host=... dbname=...`). When set it takes precedence over the discrete fields.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Namespace that is exported or cleaned (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_public_schema(),
            ssl_mode: default_require(),
        }
    }
}

impl DatabaseConfig {
    /// Connection settings from a single connection string.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_deref().map(super::redact_url))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory the three scripts are written to (default: "sql_export").
    #[serde(default = "default_scripts_dir")]
    pub output_dir: PathBuf,

    /// Export only a representative sample of each table (default: false).
    #[serde(default)]
    pub sample_data: bool,

    /// Rows per table when `sample_data` is set (default: 10).
    #[serde(default = "default_sample_rows")]
    pub sample_rows: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_scripts_dir(),
            sample_data: false,
            sample_rows: default_sample_rows(),
        }
    }
}

impl ExportConfig {
    /// Row cap passed to the catalog reader.
    pub fn row_limit(&self) -> Option<u64> {
        self.sample_data.then_some(self.sample_rows)
    }
}

/// Replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Directory the scripts are read from (default: "sql_export").
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// Drop every table and sequence of the namespace first (default: true).
    #[serde(default = "default_true")]
    pub drop_existing: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            drop_existing: true,
        }
    }
}

/// Paths of the external tools used by direct migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    #[serde(default = "default_pg_dump")]
    pub pg_dump: String,

    #[serde(default = "default_psql")]
    pub psql: String,

    #[serde(default = "default_pg_restore")]
    pub pg_restore: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            pg_dump: default_pg_dump(),
            psql: default_psql(),
            pg_restore: default_pg_restore(),
        }
    }
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("sql_export")
}

fn default_sample_rows() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_pg_dump() -> String {
    "pg_dump".to_string()
}

fn default_psql() -> String {
    "psql".to_string()
}

fn default_pg_restore() -> String {
    "pg_restore".to_string()
}
