use std::io;
use thiserror::Error;

use super::protocol::Failure;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker binary not found ({0}); set worker.path in painel.toml")]
    NotFound(String),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker pipe failed: {0}")]
    Pipe(#[source] io::Error),

    #[error("malformed worker message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("worker did not answer within {0} ms")]
    Timeout(u64),

    #[error("worker process exited")]
    Exited,

    /// The worker could not reach the database.
    #[error("database unreachable ({code}): {message}")]
    Unreachable { code: String, message: String },

    /// The database rejected or failed the statement.
    #[error("worker error ({code}): {message}")]
    Remote { code: String, message: String },
}

impl WorkerError {
    pub(crate) fn from_failure(failure: Failure) -> Self {
        let Failure { code, message } = failure;
        match code.as_str() {
            "DRIVER_NOT_FOUND" | "CONNECTION_FAILED" => Self::Unreachable { code, message },
            "WORKER_EXITED" => Self::Exited,
            _ => Self::Remote { code, message },
        }
    }

    /// Whether the failure is about reaching the database rather than
    /// running the statement.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Spawn(_)
                | Self::Pipe(_)
                | Self::Exited
                | Self::Unreachable { .. }
        )
    }
}
