//! TOML-based configuration for painel.
//!
//! Supports a config file (painel.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! catalog = "./catalog.toml"
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//!
//! [executor]
//! query_timeout_ms = 30000
//! max_rows = 5000
//! render_timeout_ms = 60000
//! filter_options_limit = 200
//!
//! [executor.pool]
//! max_open_conns = 10
//! max_idle_conns = 5
//!
//! [cache]
//! enabled = true
//! persistent = true
//! path = "${HOME}/.cache/painel/metadata.db"
//!
//! [worker]
//! path = "/usr/local/bin/painel-worker"
//! request_timeout_ms = 30000
//!
//! [logging]
//! level = "info"
//!
//! [connections.vendas]
//! driver = "postgres"
//! connection_string = "${VENDAS_DATABASE_URL}"
//!
//! [connections.local]
//! driver = "sqlite"
//! connection_string = "./data/local.db"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::connection::{ConnectionError, ConnectionRecord, Driver};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("no config file at {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable `{0}` is not set")]
    UnsetVariable(String),

    #[error("connection `{id}`: {source}")]
    Connection {
        id: String,
        #[source]
        source: ConnectionError,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the catalog file (supports ${ENV_VAR} expansion).
    pub catalog: Option<String>,

    /// HTTP server.
    pub server: ServerSettings,

    /// Query execution limits and pooling.
    pub executor: ExecutorSettings,

    /// Dataset metadata cache.
    pub cache: CacheSettings,

    /// Database worker.
    pub worker: WorkerSettings,

    /// Log output.
    pub logging: LoggingSettings,

    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Query execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Hard timeout per statement, including the wait for a pooled
    /// connection.
    pub query_timeout_ms: u64,

    /// Maximum rows a chart statement may return.
    pub max_rows: usize,

    /// Overall deadline for a full dashboard render.
    pub render_timeout_ms: u64,

    /// Maximum distinct values listed per categorical filter.
    pub filter_options_limit: u64,

    /// Connection pool settings.
    pub pool: PoolSettings,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            query_timeout_ms: 30_000,
            max_rows: 5_000,
            render_timeout_ms: 60_000,
            filter_options_limit: 200,
            pool: PoolSettings::default(),
        }
    }
}

impl ExecutorSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

/// Connection pool settings, applied per connection record.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of concurrent statements per connection record.
    pub max_open_conns: u32,

    /// Maximum number of idle connections kept for reuse (SQLite only).
    pub max_idle_conns: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open_conns: 10,
            max_idle_conns: 5,
        }
    }
}

/// Metadata cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Back the in-memory cache with a SQLite file.
    pub persistent: bool,

    /// Location of the SQLite file (defaults to the user config dir).
    pub path: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            persistent: false,
            path: None,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to worker binary.
    pub path: Option<String>,

    /// Timeout for a single worker request.
    pub request_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            request_timeout_ms: 30_000,
        }
    }
}

impl WorkerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `PAINEL_LOG`/`RUST_LOG` are unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One `[connections.<id>]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    pub driver: String,

    /// May reference environment variables.
    pub connection_string: String,

    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl ConnectionSettings {
    pub fn to_record(&self, id: &str) -> Result<ConnectionRecord, SettingsError> {
        let driver: Driver = self.driver.parse().map_err(|source| SettingsError::Connection {
            id: id.to_string(),
            source,
        })?;
        Ok(ConnectionRecord {
            id: id.to_string(),
            driver,
            connection_string: expand_env_vars(&self.connection_string)?,
            active: self.active,
        })
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SettingsError::Missing(path.to_path_buf()));
        }
        let settings: Settings = toml::from_str(&std::fs::read_to_string(path)?)?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Use `path` when given. Otherwise take `$PAINEL_CONFIG`, then
    /// `./painel.toml`, then `<config dir>/painel/config.toml`, falling
    /// back to defaults when none exists.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os("PAINEL_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }
        let candidates = [
            Some(PathBuf::from("painel.toml")),
            dirs::config_dir().map(|dir| dir.join("painel").join("config.toml")),
        ];
        match candidates.into_iter().flatten().find(|c| c.is_file()) {
            Some(found) => Self::from_file(found),
            None => Ok(Settings::default()),
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let invalid =
            |msg: &str| -> Result<(), SettingsError> { Err(SettingsError::Invalid(msg.to_string())) };
        if self.executor.pool.max_open_conns == 0 {
            return invalid("executor.pool.max_open_conns must be at least 1");
        }
        if self.executor.max_rows == 0 {
            return invalid("executor.max_rows must be at least 1");
        }
        Ok(())
    }

    /// Every configured connection, sorted by id.
    pub fn connection_records(&self) -> Result<Vec<ConnectionRecord>, SettingsError> {
        let mut records = self
            .connections
            .iter()
            .map(|(id, conn)| conn.to_record(id))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    pub fn catalog_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        expand_path(self.catalog.as_deref())
    }

    pub fn worker_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        expand_path(self.worker.path.as_deref())
    }

    pub fn cache_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        expand_path(self.cache.path.as_deref())
    }
}

fn expand_path(raw: Option<&str>) -> Result<Option<PathBuf>, SettingsError> {
    raw.map(|p| expand_env_vars(p).map(PathBuf::from)).transpose()
}

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+))").expect("static regex")
});

/// Replace `${VAR}` and `$VAR` with their values. A `$` not followed by a
/// name is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut unset = None;
    let expanded = ENV_REF.replace_all(s, |caps: &Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                unset.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match unset {
        Some(name) => Err(SettingsError::UnsetVariable(name)),
        None => Ok(expanded.into_owned()),
    }
}
