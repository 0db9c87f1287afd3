//! Column metadata inspection.
//!
//! Determines the semantic role of each output column of a raw dataset
//! query by running a zero-row probe against the dataset's connection:
//!
//! ```text
//! SELECT * FROM (<raw>) AS "__probe" LIMIT 0
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Inspector                             │
//! │  ┌───────────────────────────┐  ┌────────────────────────────┐  │
//! │  │  Probe (async)            │  │  Classification (sync)     │  │
//! │  │  - LIMIT 0 probe          │  │  - classify()              │  │
//! │  │  - LIMIT 1 sample when a  │  │    type family + ID names  │  │
//! │  │    column has no type     │  │                            │  │
//! │  └───────────────────────────┘  └────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//!           Executor                        MetadataCache
//!                                   (dataset id + raw query hash)
//! ```

mod classify;

pub use classify::{base_type, classify, is_identifier_name, type_family, TypeFamily};

use std::sync::Arc;

use crate::cache::MetadataCache;
use crate::compile::CompiledQuery;
use crate::config::ConnectionRecord;
use crate::executor::{ExecutionError, Executor, RowSet};
use crate::model::{ColumnMetadata, Dataset, DatasetMetadata};
use crate::sql::{FromSource, Query};

const PROBE_ALIAS: &str = "__probe";

/// Errors that can occur while inspecting a dataset.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("Could not introspect dataset '{dataset}': {source}")]
    Introspection {
        dataset: String,
        #[source]
        source: ExecutionError,
    },

    #[error("Dataset '{0}' is inactive")]
    DatasetInactive(String),
}

impl InspectError {
    /// The underlying execution failure, if any.
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            InspectError::Introspection { source, .. } => Some(source),
            InspectError::DatasetInactive(_) => None,
        }
    }
}

pub type InspectResult<T> = Result<T, InspectError>;

/// Infers and caches dataset column metadata.
pub struct Inspector {
    executor: Arc<Executor>,
    cache: Arc<MetadataCache>,
}

impl Inspector {
    pub fn new(executor: Arc<Executor>, cache: Arc<MetadataCache>) -> Self {
        Self { executor, cache }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Metadata for `dataset`, from cache when the raw query is unchanged.
    ///
    /// Concurrent misses may probe twice; both converge on the same entry.
    pub async fn inspect(
        &self,
        dataset: &Dataset,
        connection: &ConnectionRecord,
    ) -> InspectResult<Arc<DatasetMetadata>> {
        if !dataset.active {
            return Err(InspectError::DatasetInactive(dataset.id.clone()));
        }

        let hash = dataset.query_hash();
        if let Some(metadata) = self.cache.get(&dataset.id, &hash) {
            return Ok(metadata);
        }

        let metadata = self.probe(dataset, connection).await?;
        tracing::info!(
            dataset = %dataset.id,
            columns = metadata.columns.len(),
            "inspected dataset columns"
        );
        Ok(self.cache.insert(&dataset.id, &hash, metadata))
    }

    /// Drop any cached entry and inspect again.
    pub async fn refresh(
        &self,
        dataset: &Dataset,
        connection: &ConnectionRecord,
    ) -> InspectResult<Arc<DatasetMetadata>> {
        self.cache.invalidate(&dataset.id);
        self.inspect(dataset, connection).await
    }

    /// Run the probe without touching the cache.
    pub async fn probe(
        &self,
        dataset: &Dataset,
        connection: &ConnectionRecord,
    ) -> InspectResult<DatasetMetadata> {
        let wrap = |source| InspectError::Introspection {
            dataset: dataset.id.clone(),
            source,
        };

        let mut rows = self
            .run_probe(&dataset.query, connection, 0)
            .await
            .map_err(wrap)?;

        if rows.columns.iter().any(|c| c.database_type.is_empty()) {
            let sample = self
                .run_probe(&dataset.query, connection, 1)
                .await
                .map_err(wrap)?;
            for (column, sampled) in rows.columns.iter_mut().zip(sample.columns) {
                if column.database_type.is_empty() {
                    column.database_type = sampled.database_type;
                }
            }
        }

        Ok(DatasetMetadata::new(
            rows.columns
                .into_iter()
                .map(|c| {
                    let semantic_type = classify(&c.name, &c.database_type);
                    ColumnMetadata::new(c.name, semantic_type, c.database_type)
                })
                .collect(),
        ))
    }

    async fn run_probe(
        &self,
        raw_query: &str,
        connection: &ConnectionRecord,
        limit: u64,
    ) -> Result<RowSet, ExecutionError> {
        let dialect = connection.dialect();
        let probe = CompiledQuery {
            sql: Query::new()
                .select_star()
                .from(FromSource::subquery(raw_query, PROBE_ALIAS))
                .limit(limit)
                .to_sql(dialect),
            params: Vec::new(),
            dialect,
        };
        self.executor
            .execute_capped(connection, &probe, limit as usize)
            .await
    }
}
