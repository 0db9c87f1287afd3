//! Query execution against analytic databases.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Executor                             │
//! │   read-only check ─► pool (semaphore) ─► backend ─► row cap  │
//! │                  └────── query_timeout ──────┘               │
//! └──────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌─────────────────────────┐       ┌─────────────────────────────┐
//! │      SqliteBackend      │       │        WorkerBackend        │
//! │ rusqlite, spawn_blocking│       │  query.execute over NDJSON  │
//! └─────────────────────────┘       └─────────────────────────────┘
//! ```
//!
//! One [`ConnectionPool`] exists per connection record. Waiting for a
//! pool permit counts against the statement timeout.

mod sqlite;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::compile::CompiledQuery;
use crate::config::{ConnectionRecord, Driver, ExecutorSettings};
use crate::model::ParamValue;
use crate::validation::ensure_single_query;

pub use sqlite::SqliteBackend;
pub use worker::{SharedWorker, WorkerBackend};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Refusing to execute statement: {0}")]
    NotReadOnly(String),

    #[error("Connection '{connection}' is unavailable: {reason}")]
    ConnectionUnavailable { connection: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Query timed out after {0} ms")]
    Timeout(u64),

    #[error("Result exceeds the limit of {limit} rows")]
    ResultTooLarge { limit: usize },
}

impl ExecutionError {
    pub(crate) fn unavailable(connection: &str, reason: impl ToString) -> Self {
        Self::ConnectionUnavailable {
            connection: connection.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

// ============================================================================
// Row Sets
// ============================================================================

/// An output column as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Lower-cased type name; empty when the backend could not tell.
    pub database_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, database_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database_type: database_type.into(),
        }
    }
}

/// Raw tuples plus their column descriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Something that can run one finalized statement.
///
/// Implementations stop reading after `row_cap` rows.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: &[ParamValue],
        row_cap: usize,
    ) -> ExecutionResult<RowSet>;
}

/// Bounded concurrency in front of one backend.
pub struct ConnectionPool {
    permits: Arc<Semaphore>,
    backend: Arc<dyn QueryBackend>,
}

impl ConnectionPool {
    pub fn new(max_open: u32, backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_open.max(1) as usize)),
            backend,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run(
        &self,
        connection: &str,
        sql: &str,
        params: &[ParamValue],
        row_cap: usize,
    ) -> ExecutionResult<RowSet> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExecutionError::unavailable(connection, "pool closed"))?;
        self.backend.execute(sql, params, row_cap).await
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Runs compiled statements with a timeout, a row ceiling and per-connection
/// pools.
pub struct Executor {
    settings: ExecutorSettings,
    pools: DashMap<String, Arc<ConnectionPool>>,
    worker: Arc<SharedWorker>,
}

impl Executor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            settings,
            pools: DashMap::new(),
            worker: Arc::new(SharedWorker::default()),
        }
    }

    /// Use this worker for `postgres` and `duckdb` connections.
    pub fn with_worker(mut self, worker: SharedWorker) -> Self {
        self.worker = Arc::new(worker);
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Install a backend for a connection id ahead of first use.
    pub fn register_backend(&self, connection: &str, backend: Arc<dyn QueryBackend>) {
        self.pools.insert(
            connection.to_string(),
            Arc::new(ConnectionPool::new(self.settings.pool.max_open_conns, backend)),
        );
    }

    fn pool(&self, record: &ConnectionRecord) -> Arc<ConnectionPool> {
        self.pools
            .entry(record.id.clone())
            .or_insert_with(|| {
                let backend: Arc<dyn QueryBackend> = match record.driver {
                    Driver::Sqlite => Arc::new(SqliteBackend::new(
                        &record.id,
                        &record.connection_string,
                        self.settings.pool.max_idle_conns as usize,
                    )),
                    Driver::Postgres | Driver::DuckDb => Arc::new(WorkerBackend::new(
                        Arc::clone(&self.worker),
                        record,
                    )),
                };
                tracing::debug!(connection = %record.id, driver = record.driver.as_str(), "created connection pool");
                Arc::new(ConnectionPool::new(self.settings.pool.max_open_conns, backend))
            })
            .clone()
    }

    /// Run a compiled statement, failing when it returns more than
    /// `max_rows` rows.
    pub async fn execute(
        &self,
        record: &ConnectionRecord,
        query: &CompiledQuery,
    ) -> ExecutionResult<RowSet> {
        self.execute_capped(record, query, self.settings.max_rows).await
    }

    /// Run a compiled statement with an explicit row ceiling.
    pub async fn execute_capped(
        &self,
        record: &ConnectionRecord,
        query: &CompiledQuery,
        max_rows: usize,
    ) -> ExecutionResult<RowSet> {
        if !record.active {
            return Err(ExecutionError::unavailable(&record.id, "connection is inactive"));
        }
        ensure_single_query(&query.sql, query.dialect)
            .map_err(|e| ExecutionError::NotReadOnly(e.to_string()))?;

        let pool = self.pool(record);
        let timeout = self.settings.query_timeout();
        let started = std::time::Instant::now();

        let rows = tokio::time::timeout(
            timeout,
            pool.run(&record.id, &query.sql, &query.params, max_rows.saturating_add(1)),
        )
        .await
        .map_err(|_| ExecutionError::Timeout(duration_ms(timeout)))??;

        tracing::debug!(
            connection = %record.id,
            rows = rows.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "executed statement"
        );

        if rows.row_count() > max_rows {
            return Err(ExecutionError::ResultTooLarge { limit: max_rows });
        }
        Ok(rows)
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}
