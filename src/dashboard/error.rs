//! The error surface of the engine boundary.

use crate::compile::CompileError;
use crate::executor::ExecutionError;
use crate::metadata::InspectError;
use crate::normalize::NormalizeError;

use super::catalog::CatalogError;

/// Everything a render can fail with.
///
/// `kind()` is a stable snake_case name for API payloads; `status()` is the
/// HTTP status of the error class.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("Dashboard render exceeded its {0} ms deadline")]
    RenderDeadlineExceeded(u64),
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            other => EngineError::Catalog(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

fn execution_kind(err: &ExecutionError) -> &'static str {
    match err {
        ExecutionError::NotReadOnly(_) => "not_read_only",
        ExecutionError::ConnectionUnavailable { .. } => "connection_unavailable",
        ExecutionError::QueryFailed(_) => "query_failed",
        ExecutionError::Timeout(_) => "execution_timeout",
        ExecutionError::ResultTooLarge { .. } => "result_too_large",
    }
}

fn execution_status(err: &ExecutionError) -> u16 {
    match err {
        ExecutionError::NotReadOnly(_) => 500,
        ExecutionError::ConnectionUnavailable { .. } => 503,
        ExecutionError::QueryFailed(_) => 502,
        ExecutionError::Timeout(_) => 504,
        ExecutionError::ResultTooLarge { .. } => 413,
    }
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Catalog(_) => "internal",
            EngineError::Compile(CompileError::InvalidChartConfiguration { .. }) => {
                "invalid_chart_configuration"
            }
            EngineError::Compile(CompileError::Validation(_)) => "validation_error",
            EngineError::Compile(CompileError::InvalidFilter { .. }) => "invalid_filter",
            EngineError::Compile(CompileError::DatasetInactive(_))
            | EngineError::Inspect(InspectError::DatasetInactive(_)) => "dataset_inactive",
            EngineError::Inspect(InspectError::Introspection { .. }) => "introspection_error",
            EngineError::Execution(err) => execution_kind(err),
            EngineError::Normalize(_) => "internal",
            EngineError::RenderDeadlineExceeded(_) => "render_deadline_exceeded",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            EngineError::NotFound { .. } => 404,
            EngineError::Compile(CompileError::DatasetInactive(_))
            | EngineError::Inspect(InspectError::DatasetInactive(_)) => 409,
            EngineError::Compile(_) => 400,
            EngineError::Inspect(InspectError::Introspection { .. }) => 503,
            EngineError::Execution(err) => execution_status(err),
            EngineError::RenderDeadlineExceeded(_) => 504,
            EngineError::Catalog(_) | EngineError::Normalize(_) => 500,
        }
    }

    /// Whether the failure happened before any database round-trip.
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Compile(_))
    }
}
