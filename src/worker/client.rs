use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::error::{WorkerError, WorkerResult};
use super::protocol::{ExecuteParams, ExecuteResult, Request, Response, EXECUTE};

const BINARY: &str = "painel-worker";

type Pending = Arc<StdMutex<HashMap<String, oneshot::Sender<Response>>>>;

/// A running worker process.
///
/// Requests are multiplexed over one stdin/stdout pair. A background task
/// routes each response line to the caller waiting on its id. Dropping a
/// request future forgets its id, so a late answer is discarded.
pub struct WorkerClient {
    stdin: Mutex<BufWriter<ChildStdin>>,
    pending: Pending,
    reader: JoinHandle<()>,
    timeout: Duration,
    _child: Child,
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient")
            .field("timeout", &self.timeout)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Removes a pending id when its request finishes or is cancelled.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(self.id);
        }
    }
}

impl WorkerClient {
    /// Where to find the worker: the configured path, a binary next to the
    /// working directory, then `PATH`.
    pub fn locate(configured: Option<&Path>) -> WorkerResult<PathBuf> {
        if let Some(path) = configured {
            return Ok(path.to_path_buf());
        }
        let local = Path::new(".").join(BINARY);
        if local.is_file() {
            return Ok(local);
        }
        std::env::var_os("PATH")
            .into_iter()
            .flat_map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .map(|dir| dir.join(BINARY))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| WorkerError::NotFound(BINARY.to_string()))
    }

    pub async fn spawn(path: &Path, timeout: Duration) -> WorkerResult<Self> {
        let mut child = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(WorkerError::Spawn(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "worker stdio was not captured",
            )));
        };

        let pending = Pending::default();
        let reader = tokio::spawn(route_responses(stdout, Arc::clone(&pending)));
        tracing::info!(path = %path.display(), "worker started");

        Ok(Self {
            stdin: Mutex::new(BufWriter::new(stdin)),
            pending,
            reader,
            timeout,
            _child: child,
        })
    }

    /// `false` once the worker closed its output.
    pub fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Send one request and wait for its answer.
    pub async fn call<P: Serialize>(&self, method: &'static str, params: P) -> WorkerResult<Value> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut line = serde_json::to_string(&Request {
            id: &id,
            method,
            params,
        })?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| WorkerError::Exited)?
            .insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(WorkerError::Pipe)?;
            stdin.flush().await.map_err(WorkerError::Pipe)?;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(WorkerError::Exited),
            Err(_) => Err(WorkerError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    pub async fn execute(&self, params: ExecuteParams<'_>) -> WorkerResult<ExecuteResult> {
        let result = self.call(EXECUTE, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Hand each response line to its waiting caller until the worker's
/// output closes. Remaining callers then see [`WorkerError::Exited`].
async fn route_responses(stdout: ChildStdout, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Response>(&line) {
                Ok(response) => {
                    let waiter = pending
                        .lock()
                        .ok()
                        .and_then(|mut p| p.remove(&response.id));
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => tracing::debug!(id = %response.id, "dropping unclaimed worker response"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "unparseable worker response"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "worker read failed");
                break;
            }
        }
    }
    tracing::warn!("worker output closed");
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
}
