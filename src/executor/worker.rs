//! Worker-backed execution for `postgres` and `duckdb` connections.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ColumnInfo, ExecutionError, ExecutionResult, QueryBackend, RowSet};
use crate::config::{ConnectionRecord, Driver};
use crate::model::ParamValue;
use crate::worker::protocol::{ExecuteParams, ExecuteResult};
use crate::worker::{WorkerClient, WorkerError, WorkerResult};

/// One worker process shared by every worker-backed pool.
///
/// Spawned on first use and respawned if it exits.
pub struct SharedWorker {
    path: Option<PathBuf>,
    timeout: Duration,
    client: Mutex<Option<Arc<WorkerClient>>>,
}

impl Default for SharedWorker {
    fn default() -> Self {
        Self::new(None, Duration::from_secs(30))
    }
}

impl SharedWorker {
    pub fn new(path: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            path,
            timeout,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> WorkerResult<Arc<WorkerClient>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref().filter(|c| c.is_alive()) {
            return Ok(Arc::clone(client));
        }

        let path = WorkerClient::locate(self.path.as_deref())?;
        tracing::debug!(path = %path.display(), "spawning database worker");
        let client = Arc::new(WorkerClient::spawn(&path, self.timeout).await?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }
}

/// Runs statements for one connection record through the worker.
pub struct WorkerBackend {
    worker: Arc<SharedWorker>,
    connection_id: String,
    driver: Driver,
    connection_string: String,
}

impl WorkerBackend {
    pub fn new(worker: Arc<SharedWorker>, record: &ConnectionRecord) -> Self {
        Self {
            worker,
            connection_id: record.id.clone(),
            driver: record.driver,
            connection_string: record.connection_string.clone(),
        }
    }

    fn map_error(&self, err: WorkerError) -> ExecutionError {
        match err {
            WorkerError::Timeout(ms) => ExecutionError::Timeout(ms),
            err if err.is_connection_failure() => {
                ExecutionError::unavailable(&self.connection_id, err)
            }
            err => ExecutionError::QueryFailed(err.to_string()),
        }
    }
}

fn into_row_set(response: ExecuteResult) -> RowSet {
    RowSet {
        columns: response
            .columns
            .into_iter()
            .map(|c| ColumnInfo::new(c.name, c.data_type.to_ascii_lowercase()))
            .collect(),
        rows: response.rows,
    }
}

#[async_trait]
impl QueryBackend for WorkerBackend {
    async fn execute(
        &self,
        sql: &str,
        params: &[ParamValue],
        row_cap: usize,
    ) -> ExecutionResult<RowSet> {
        let client = self.worker.client().await.map_err(|e| self.map_error(e))?;
        let args: Vec<_> = params.iter().map(serde_json::Value::from).collect();
        let response = client
            .execute(ExecuteParams {
                driver: self.driver.as_str(),
                connection_string: &self.connection_string,
                sql,
                args: &args,
                max_rows: row_cap,
            })
            .await
            .map_err(|e| self.map_error(e))?;

        let mut rows = into_row_set(response);
        rows.rows.truncate(row_cap);
        Ok(rows)
    }
}
