//! Connection records: the analytic databases datasets are bound to.
//!
//! The driver selects both the SQL dialect and the executor backend:
//! `sqlite` runs in-process, `postgres` and `duckdb` go through the
//! database worker.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sql::Dialect;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("unknown driver `{0}` (expected sqlite, postgres or duckdb)")]
    UnknownDriver(String),
}

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// SQLite file or in-memory database, executed in-process.
    Sqlite,
    /// PostgreSQL, through the worker.
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    /// DuckDB, through the worker.
    #[serde(alias = "duck")]
    DuckDb,
}

impl FromStr for Driver {
    type Err = ConnectionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let driver = match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Self::Sqlite,
            "postgres" | "postgresql" | "pg" => Self::Postgres,
            "duckdb" | "duck" => Self::DuckDb,
            _ => return Err(ConnectionError::UnknownDriver(name.to_string())),
        };
        Ok(driver)
    }
}

impl Driver {
    /// Name the worker expects in `query.execute`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::DuckDb => "duckdb",
        }
    }

    pub fn dialect(self) -> Dialect {
        match self {
            Self::Sqlite => Dialect::Sqlite,
            Self::Postgres => Dialect::Postgres,
            Self::DuckDb => Dialect::DuckDb,
        }
    }

    /// Queries run inside this process rather than in the worker.
    pub fn is_embedded(self) -> bool {
        self == Self::Sqlite
    }
}

/// A resolved connection, with environment variables already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: String,
    pub driver: Driver,
    pub connection_string: String,
    pub active: bool,
}

impl ConnectionRecord {
    pub fn new(id: impl Into<String>, driver: Driver, connection_string: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            driver,
            connection_string: connection_string.into(),
            active: true,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }
}
